//! In-memory platform for tests and the simulator.
//!
//! [`InMemoryPlatform`] implements both [`PermissionOracle`] and
//! [`LocationPlatform`]. Everything is driven by hand: providers are
//! switched on and off, last-known fixes are seeded and readings are
//! emitted explicitly with [`InMemoryPlatform::emit`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use parking_lot::Mutex;

use super::platform::{
    LocationPlatform, PermissionOracle, PlatformError, SubscriptionToken, UpdateParams,
};
use super::sink::{ReadingSink, SubscriptionSinks};
use crate::reading::{ProviderId, Reading};

struct LiveSubscription {
    provider: ProviderId,
    params: UpdateParams,
    sinks: SubscriptionSinks,
}

struct PlatformState {
    permission: bool,
    service_enabled: bool,
    enabled: BTreeSet<ProviderId>,
    last_known: HashMap<ProviderId, Reading>,
    failing: BTreeSet<ProviderId>,
    subscriptions: BTreeMap<SubscriptionToken, LiveSubscription>,
}

/// Hand-driven platform.
pub struct InMemoryPlatform {
    state: Mutex<PlatformState>,
}

impl Default for InMemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPlatform {
    /// Platform with permission granted and every device provider enabled.
    pub fn new() -> Self {
        Self::with_enabled(&ProviderId::DEVICE)
    }

    /// Platform with permission granted and only `providers` enabled.
    pub fn with_enabled(providers: &[ProviderId]) -> Self {
        Self {
            state: Mutex::new(PlatformState {
                permission: true,
                service_enabled: true,
                enabled: providers.iter().copied().filter(|p| p.is_device()).collect(),
                last_known: HashMap::new(),
                failing: BTreeSet::new(),
                subscriptions: BTreeMap::new(),
            }),
        }
    }

    pub fn set_permission(&self, granted: bool) {
        self.state.lock().permission = granted;
    }

    pub fn set_service_enabled(&self, enabled: bool) {
        self.state.lock().service_enabled = enabled;
    }

    /// Switch a provider on or off, notifying its live subscriptions.
    pub fn set_provider_enabled(&self, provider: ProviderId, enabled: bool) {
        let sinks: Vec<SubscriptionSinks> = {
            let mut state = self.state.lock();
            let changed = if enabled {
                state.enabled.insert(provider)
            } else {
                state.enabled.remove(&provider)
            };
            if !changed {
                return;
            }
            state
                .subscriptions
                .values()
                .filter(|s| s.provider == provider)
                .map(|s| s.sinks.clone())
                .collect()
        };

        for s in sinks {
            if enabled {
                s.lifecycle.provider_enabled();
            } else {
                s.lifecycle.provider_disabled();
            }
        }
    }

    /// Seed the provider's last-known fix.
    pub fn set_last_known(&self, reading: Reading) {
        self.state.lock().last_known.insert(reading.source(), reading);
    }

    pub fn clear_last_known(&self, provider: ProviderId) {
        self.state.lock().last_known.remove(&provider);
    }

    /// Make subscribe calls for `provider` fail (or succeed again).
    pub fn fail_subscriptions(&self, provider: ProviderId, fail: bool) {
        let mut state = self.state.lock();
        if fail {
            state.failing.insert(provider);
        } else {
            state.failing.remove(&provider);
        }
    }

    /// Push a reading to every live subscription of its provider.
    ///
    /// Returns how many sinks accepted it.
    pub fn emit(&self, reading: Reading) -> usize {
        let sinks = self.reading_sinks(reading.source());
        sinks
            .into_iter()
            .filter(|sink| sink.deliver(reading.clone()))
            .count()
    }

    /// Live subscriptions for `provider`.
    pub fn live_subscriptions(&self, provider: ProviderId) -> usize {
        self.state
            .lock()
            .subscriptions
            .values()
            .filter(|s| s.provider == provider)
            .count()
    }

    pub fn total_live_subscriptions(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    /// Update parameters of the live subscriptions for `provider`.
    pub fn subscription_params(&self, provider: ProviderId) -> Vec<UpdateParams> {
        self.state
            .lock()
            .subscriptions
            .values()
            .filter(|s| s.provider == provider)
            .map(|s| s.params)
            .collect()
    }

    /// Clones of the reading sinks currently registered for `provider`.
    ///
    /// A clone outlives [`unsubscribe`](LocationPlatform::unsubscribe), which
    /// lets tests deliver readings the way a slow platform would after the
    /// subscription is gone.
    pub fn reading_sinks(&self, provider: ProviderId) -> Vec<ReadingSink> {
        self.state
            .lock()
            .subscriptions
            .values()
            .filter(|s| s.provider == provider)
            .map(|s| s.sinks.readings.clone())
            .collect()
    }
}

impl PermissionOracle for InMemoryPlatform {
    fn has_permission(&self) -> bool {
        self.state.lock().permission
    }

    fn is_service_enabled(&self) -> bool {
        self.state.lock().service_enabled
    }
}

impl LocationPlatform for InMemoryPlatform {
    fn is_provider_enabled(&self, provider: ProviderId) -> bool {
        self.state.lock().enabled.contains(&provider)
    }

    fn last_known_reading(&self, provider: ProviderId) -> Option<Reading> {
        self.state.lock().last_known.get(&provider).cloned()
    }

    fn subscribe(
        &self,
        token: SubscriptionToken,
        provider: ProviderId,
        params: UpdateParams,
        sinks: SubscriptionSinks,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        if !state.permission {
            return Err(PlatformError::PermissionRevoked(provider));
        }
        if !state.enabled.contains(&provider) {
            return Err(PlatformError::ProviderRemoved(provider));
        }
        if state.failing.contains(&provider) {
            return Err(PlatformError::Rejected {
                provider,
                reason: "subscription failure injected".to_string(),
            });
        }

        state.subscriptions.insert(
            token,
            LiveSubscription {
                provider,
                params,
                sinks,
            },
        );
        Ok(())
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        self.state.lock().subscriptions.remove(&token);
    }
}
