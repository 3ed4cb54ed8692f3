//! Request coordinator - the public face of the engine.
//!
//! # One-shot flow
//!
//! ```text
//! preconditions ──► cached best? ──yes──► resolve
//!                        │ no
//!                        ▼
//!               subscribe eligible ──none──► IP fallback ──► resolve / NoProviderAvailable
//!                        │
//!                        ▼
//!      ┌──── first reading before deadline ────► release, resolve
//!      └──── deadline ──► release ──► cached? ──► resolve / (IP?) / Timeout
//! ```
//!
//! Each one-shot runs inside the caller's future. Readings, the deadline
//! and shutdown race in a biased `select!`, readings first. A reading is
//! only accepted while `now < deadline`.
//!
//! # Continuous flow
//!
//! Watches are delegated to the [`WatchRegistry`]; every reading from any
//! subscribed provider is streamed to the callback unfiltered.

mod options;
mod pending;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::LocateError;
use crate::fallback::IpFallback;
use crate::provider::{
    LocationPlatform, PermissionOracle, ProviderEvent, ProviderPool, SubscriptionOwner,
};
use crate::reading::Reading;
use crate::watch::{WatchCallback, WatchInfo, WatchOptions, WatchRegistry};

pub use options::{
    CoordinatorConfig, RequestOptions, DEFAULT_ONE_SHOT_DISTANCE_METERS, DEFAULT_ONE_SHOT_INTERVAL,
    DEFAULT_TIMEOUT,
};
use pending::PendingRequest;

enum Outcome {
    Reading(Reading),
    Deadline,
    Shutdown,
}

/// Arbitrates one-shot and continuous position requests.
pub struct Coordinator {
    oracle: Arc<dyn PermissionOracle>,
    pool: Arc<ProviderPool>,
    registry: WatchRegistry,
    fallback: Option<Arc<IpFallback>>,
    config: CoordinatorConfig,
    shutdown: CancellationToken,
    next_request: AtomicU64,
    next_watch: AtomicU64,
}

impl Coordinator {
    pub fn new(
        oracle: Arc<dyn PermissionOracle>,
        platform: Arc<dyn LocationPlatform>,
        config: CoordinatorConfig,
    ) -> Self {
        let pool = Arc::new(ProviderPool::new(platform));
        Self {
            oracle,
            registry: WatchRegistry::new(Arc::clone(&pool)),
            pool,
            fallback: None,
            config,
            shutdown: CancellationToken::new(),
            next_request: AtomicU64::new(1),
            next_watch: AtomicU64::new(1),
        }
    }

    /// Attach the IP fallback used as a last resort for one-shots.
    pub fn with_fallback(mut self, fallback: IpFallback) -> Self {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<ProviderPool> {
        &self.pool
    }

    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    // =========================================================================
    // One-shot
    // =========================================================================

    /// One-shot request with the configured default options.
    pub async fn current_position(&self) -> Result<Reading, LocateError> {
        self.get_current_position(self.config.request).await
    }

    /// Resolve a single position.
    pub async fn get_current_position(
        &self,
        options: RequestOptions,
    ) -> Result<Reading, LocateError> {
        self.check_preconditions()?;

        let owner = SubscriptionOwner::Request(self.next_request.fetch_add(1, Ordering::Relaxed));
        let request_id = owner.to_string();

        if let Some(cached) = self.pool.cached_best() {
            debug!(
                request_id = %request_id,
                provider = %cached.source(),
                accuracy_m = cached.accuracy_meters(),
                "Resolved from cache"
            );
            return Ok(cached);
        }

        let mut pending = PendingRequest::new(request_id, options.timeout);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriptions = match self.pool.subscribe_eligible(
            &owner,
            options.update_params(),
            options.high_accuracy,
            &tx,
        ) {
            Ok(set) => set,
            Err(e) => {
                warn!(request_id = %pending.id(), error = %e, "No device provider, trying IP fallback");
                return self
                    .locate_by_ip()
                    .await
                    .ok_or(LocateError::NoProviderAvailable);
            }
        };
        // The platform holds the sinks; the channel closes once it lets go.
        drop(tx);

        debug!(
            request_id = %pending.id(),
            providers = ?subscriptions.providers(),
            timeout_ms = options.timeout.as_millis() as u64,
            "Waiting for first reading"
        );

        let deadline = tokio::time::sleep_until(pending.deadline());
        tokio::pin!(deadline);
        let mut channel_open = true;

        let outcome = loop {
            tokio::select! {
                biased;
                event = rx.recv(), if channel_open => match event {
                    Some(ProviderEvent::Reading { token, reading }) => {
                        if subscriptions.contains(token) && pending.accept(Instant::now()) {
                            break Outcome::Reading(reading);
                        }
                    }
                    Some(ProviderEvent::Status { provider, status, .. }) => {
                        debug!(request_id = %pending.id(), %provider, %status, "Provider status changed mid-request");
                    }
                    None => channel_open = false,
                },
                _ = &mut deadline => {
                    pending.expire();
                    break Outcome::Deadline;
                }
                _ = self.shutdown.cancelled() => break Outcome::Shutdown,
            }
        };

        self.pool.release(&subscriptions);

        match outcome {
            Outcome::Reading(reading) => {
                info!(
                    request_id = %pending.id(),
                    provider = %reading.source(),
                    accuracy_m = reading.accuracy_meters(),
                    "Position resolved"
                );
                Ok(reading)
            }
            Outcome::Deadline => {
                if let Some(cached) = self.pool.cached_best() {
                    info!(request_id = %pending.id(), provider = %cached.source(), "Deadline reached, resolved from cache");
                    return Ok(cached);
                }
                if self.config.fallback_on_timeout {
                    if let Some(reading) = self.locate_by_ip().await {
                        info!(request_id = %pending.id(), "Deadline reached, resolved by IP");
                        return Ok(reading);
                    }
                }
                warn!(request_id = %pending.id(), "Position request timed out");
                Err(LocateError::Timeout)
            }
            Outcome::Shutdown => {
                debug!(request_id = %pending.id(), "Request aborted by shutdown");
                Err(LocateError::ServiceUnavailable)
            }
        }
    }

    async fn locate_by_ip(&self) -> Option<Reading> {
        match &self.fallback {
            Some(fallback) => fallback.locate().await,
            None => None,
        }
    }

    // =========================================================================
    // Watches
    // =========================================================================

    /// Start (or replace) a continuous watch.
    ///
    /// When `id` is `None` an id of the form `watch-<n>` is generated. The
    /// watch id is returned. Must be called from within a Tokio runtime.
    pub fn watch_position(
        &self,
        id: Option<&str>,
        options: WatchOptions,
        callback: Arc<dyn WatchCallback>,
    ) -> Result<String, LocateError> {
        self.check_preconditions()?;

        let id = match id {
            Some(id) => id.to_string(),
            None => self.generate_watch_id(),
        };

        match self.registry.register(&id, options, callback) {
            Ok(replaced) => {
                if replaced {
                    debug!(watch_id = %id, "Watch replaced");
                }
                Ok(id)
            }
            Err(e) => {
                warn!(watch_id = %id, error = %e, "Watch could not start");
                Err(LocateError::NoProviderAvailable)
            }
        }
    }

    /// Start (or replace) a watch with the configured default options.
    pub fn watch_position_with_defaults(
        &self,
        id: Option<&str>,
        callback: Arc<dyn WatchCallback>,
    ) -> Result<String, LocateError> {
        self.watch_position(id, self.config.watch, callback)
    }

    /// Next `watch-<n>` id not already taken by a caller-chosen id.
    fn generate_watch_id(&self) -> String {
        loop {
            let id = format!("watch-{}", self.next_watch.fetch_add(1, Ordering::Relaxed));
            if !self.registry.contains(&id) {
                return id;
            }
            debug!(watch_id = %id, "Generated watch id already in use, skipping");
        }
    }

    /// Stop a watch. Returns false for unknown ids.
    pub fn clear_watch(&self, id: &str) -> bool {
        self.registry.clear(id)
    }

    pub fn watch_info(&self, id: &str) -> Option<WatchInfo> {
        self.registry.watch_info(id)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Host application went to the background: clear all watches but
    /// remember them.
    pub fn on_pause(&self) -> usize {
        self.registry.pause()
    }

    /// Host application came back: restart every remembered watch with the
    /// same parameters. Returns the ids that could not be restarted.
    ///
    /// Permission and service state are checked first. If they fail, nothing
    /// is subscribed and every watch stays remembered for the next resume.
    pub fn on_resume(&self) -> Vec<String> {
        if let Err(e) = self.check_preconditions() {
            let remembered = self.registry.paused_ids();
            if !remembered.is_empty() {
                warn!(
                    error = %e,
                    watches = ?remembered,
                    "Cannot resume watches, keeping them paused"
                );
            }
            return remembered;
        }
        self.registry
            .resume()
            .into_iter()
            .filter_map(|(id, outcome)| outcome.err().map(|_| id))
            .collect()
    }

    /// Tear everything down. Later requests fail with `ServiceUnavailable`.
    pub fn shutdown(&self) {
        info!("Coordinator shutting down");
        self.shutdown.cancel();
        self.registry.shutdown();
    }

    fn check_preconditions(&self) -> Result<(), LocateError> {
        if self.is_shut_down() {
            return Err(LocateError::ServiceUnavailable);
        }
        if !self.oracle.has_permission() {
            return Err(LocateError::PermissionDenied);
        }
        if !self.oracle.is_service_enabled() || self.pool.enabled_providers().is_empty() {
            return Err(LocateError::ServiceUnavailable);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("pool", &self.pool)
            .field("registry", &self.registry)
            .field("fallback", &self.fallback)
            .field("config", &self.config)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
