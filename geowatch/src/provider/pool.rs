//! Provider pool - enabled-provider discovery and subscription bookkeeping.
//!
//! The pool sits between the engine and the [`LocationPlatform`]. It owns
//! the token counter, tracks which subscriptions are live per
//! `(provider, owner)` pair and fans provider lifecycle changes out to
//! listeners.
//!
//! Owners are typed: watches and one-shot requests live in separate
//! namespaces, so a caller-chosen watch id can never alias a request.
//!
//! Platform failures stop here: a provider that refuses a subscription is
//! logged and skipped for the current attempt. Only the case where *no*
//! provider could be subscribed is reported upwards, as
//! [`PoolError::NoEligibleProvider`].

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use super::platform::{LocationPlatform, SubscriptionToken, UpdateParams};
use super::sink::{LifecycleEvent, LifecycleSink, ProviderEvent, ReadingSink, SubscriptionSinks};
use crate::arbiter;
use crate::reading::{ProviderId, Reading};

/// Capacity of the lifecycle broadcast channel.
const LIFECYCLE_CHANNEL_CAPACITY: usize = 64;

/// Holder of a set of subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubscriptionOwner {
    /// A continuous watch, by caller-visible id.
    Watch(String),
    /// A one-shot request, by sequence number.
    Request(u64),
}

impl SubscriptionOwner {
    pub fn watch(id: impl Into<String>) -> Self {
        Self::Watch(id.into())
    }
}

impl std::fmt::Display for SubscriptionOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Watch(id) => write!(f, "watch '{id}'"),
            Self::Request(seq) => write!(f, "request-{seq}"),
        }
    }
}

/// Errors reported by the pool.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    /// Not a single eligible provider accepted a subscription.
    #[error("no eligible provider could be subscribed for {owner}")]
    NoEligibleProvider { owner: SubscriptionOwner },
}

/// One live platform subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub token: SubscriptionToken,
    pub provider: ProviderId,
}

/// The subscriptions issued for one owner in a subscribe-all pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSet {
    owner: SubscriptionOwner,
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn owner(&self) -> &SubscriptionOwner {
        &self.owner
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    /// Providers bound by this set.
    pub fn providers(&self) -> BTreeSet<ProviderId> {
        self.subscriptions.iter().map(|s| s.provider).collect()
    }

    /// Provider behind `token`, if the token belongs to this set.
    pub fn provider_for(&self, token: SubscriptionToken) -> Option<ProviderId> {
        self.subscriptions
            .iter()
            .find(|s| s.token == token)
            .map(|s| s.provider)
    }

    pub fn contains(&self, token: SubscriptionToken) -> bool {
        self.provider_for(token).is_some()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

/// Pool of device providers behind a [`LocationPlatform`].
pub struct ProviderPool {
    platform: Arc<dyn LocationPlatform>,
    next_token: AtomicU64,
    /// Live subscriptions keyed by (provider, owner id).
    live: DashMap<(ProviderId, SubscriptionOwner), SubscriptionToken>,
    lifecycle_tx: broadcast::Sender<LifecycleEvent>,
}

impl ProviderPool {
    pub fn new(platform: Arc<dyn LocationPlatform>) -> Self {
        let (lifecycle_tx, _) = broadcast::channel(LIFECYCLE_CHANNEL_CAPACITY);
        Self {
            platform,
            next_token: AtomicU64::new(1),
            live: DashMap::new(),
            lifecycle_tx,
        }
    }

    /// Device providers the platform currently reports as enabled, in
    /// trust-priority order.
    pub fn enabled_providers(&self) -> Vec<ProviderId> {
        ProviderId::DEVICE
            .into_iter()
            .filter(|p| self.platform.is_provider_enabled(*p))
            .collect()
    }

    /// Providers a request may subscribe to.
    ///
    /// High-accuracy requests are restricted to GPS.
    pub fn eligible_providers(&self, high_accuracy_only: bool) -> Vec<ProviderId> {
        self.enabled_providers()
            .into_iter()
            .filter(|p| !high_accuracy_only || *p == ProviderId::Gps)
            .collect()
    }

    /// Best cached reading across all enabled providers.
    pub fn cached_best(&self) -> Option<Reading> {
        let cached: Vec<Reading> = self
            .enabled_providers()
            .into_iter()
            .filter_map(|p| self.platform.last_known_reading(p))
            .collect();

        arbiter::best_of(&cached).cloned()
    }

    /// Subscribe `owner` to a single provider.
    ///
    /// An existing subscription for the same `(provider, owner)` pair is
    /// released first.
    pub fn subscribe(
        &self,
        provider: ProviderId,
        owner: &SubscriptionOwner,
        params: UpdateParams,
        tx: &mpsc::UnboundedSender<ProviderEvent>,
    ) -> Result<Subscription, super::PlatformError> {
        let key = (provider, owner.clone());
        if let Some((_, stale)) = self.live.remove(&key) {
            warn!(
                %provider,
                %owner,
                subscription = %stale,
                "Duplicate subscription for owner, releasing the older one"
            );
            self.platform.unsubscribe(stale);
        }

        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let sinks = SubscriptionSinks {
            readings: ReadingSink::new(token, provider, tx.clone()),
            lifecycle: LifecycleSink::new(token, provider, tx.clone(), self.lifecycle_tx.clone()),
        };

        self.platform.subscribe(token, provider, params, sinks)?;
        self.live.insert(key, token);

        debug!(
            %provider,
            %owner,
            subscription = %token,
            min_interval_ms = params.min_interval.as_millis() as u64,
            min_distance_m = params.min_distance_meters,
            "Subscribed"
        );
        Ok(Subscription { token, provider })
    }

    /// Subscribe `owner` to every eligible provider in parallel.
    ///
    /// Providers that refuse are logged and skipped. Fails only if no
    /// subscription at all could be issued.
    pub fn subscribe_eligible(
        &self,
        owner: &SubscriptionOwner,
        params: UpdateParams,
        high_accuracy_only: bool,
        tx: &mpsc::UnboundedSender<ProviderEvent>,
    ) -> Result<SubscriptionSet, PoolError> {
        let mut subscriptions = Vec::new();

        for provider in self.eligible_providers(high_accuracy_only) {
            match self.subscribe(provider, owner, params, tx) {
                Ok(subscription) => subscriptions.push(subscription),
                Err(e) => {
                    warn!(%provider, %owner, error = %e, "Provider unavailable for this attempt");
                }
            }
        }

        if subscriptions.is_empty() {
            return Err(PoolError::NoEligibleProvider {
                owner: owner.clone(),
            });
        }

        Ok(SubscriptionSet {
            owner: owner.clone(),
            subscriptions,
        })
    }

    /// Release a single subscription.
    pub fn unsubscribe(&self, owner: &SubscriptionOwner, subscription: &Subscription) {
        let key = (subscription.provider, owner.clone());
        // Only drop the table entry if it still points at this token; a
        // replacement may already own the slot.
        self.live
            .remove_if(&key, |_, token| *token == subscription.token);
        self.platform.unsubscribe(subscription.token);
    }

    /// Release every subscription in `set`.
    pub fn release(&self, set: &SubscriptionSet) {
        for subscription in &set.subscriptions {
            self.unsubscribe(&set.owner, subscription);
        }
        debug!(owner = %set.owner, count = set.len(), "Released subscriptions");
    }

    /// Number of live subscriptions tracked by the pool.
    pub fn live_subscription_count(&self) -> usize {
        self.live.len()
    }

    /// Number of live subscriptions held by `owner`.
    pub fn live_subscriptions_for(&self, owner: &SubscriptionOwner) -> usize {
        self.live.iter().filter(|e| &e.key().1 == owner).count()
    }

    /// Listen for provider enabled/disabled changes.
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle_tx.subscribe()
    }
}

impl std::fmt::Debug for ProviderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderPool")
            .field("live", &self.live.len())
            .finish_non_exhaustive()
    }
}
