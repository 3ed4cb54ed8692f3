//! Request options and coordinator configuration.

use std::time::Duration;

use crate::provider::UpdateParams;
use crate::watch::WatchOptions;

/// Default one-shot deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default minimum interval requested for one-shot subscriptions.
pub const DEFAULT_ONE_SHOT_INTERVAL: Duration = Duration::from_secs(10);

/// Default minimum distance requested for one-shot subscriptions.
pub const DEFAULT_ONE_SHOT_DISTANCE_METERS: f64 = 10.0;

/// Options of a one-shot position request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestOptions {
    /// Time allowed from subscription to first reading.
    pub timeout: Duration,
    /// Restrict the request to GPS.
    pub high_accuracy: bool,
    pub min_interval: Duration,
    pub min_distance_meters: f64,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            high_accuracy: true,
            min_interval: DEFAULT_ONE_SHOT_INTERVAL,
            min_distance_meters: DEFAULT_ONE_SHOT_DISTANCE_METERS,
        }
    }
}

impl RequestOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_high_accuracy(mut self, high_accuracy: bool) -> Self {
        self.high_accuracy = high_accuracy;
        self
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn with_min_distance(mut self, meters: f64) -> Self {
        self.min_distance_meters = meters;
        self
    }

    pub fn update_params(&self) -> UpdateParams {
        UpdateParams::new(self.min_interval, self.min_distance_meters)
    }
}

/// Coordinator-wide behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CoordinatorConfig {
    /// Options used by [`Coordinator::current_position`](super::Coordinator::current_position).
    pub request: RequestOptions,
    /// Options used by [`Coordinator::watch_position_with_defaults`](super::Coordinator::watch_position_with_defaults).
    pub watch: WatchOptions,
    /// Try the IP fallback when a one-shot times out with nothing cached.
    pub fallback_on_timeout: bool,
}

impl CoordinatorConfig {
    pub fn with_request(mut self, request: RequestOptions) -> Self {
        self.request = request;
        self
    }

    pub fn with_watch(mut self, watch: WatchOptions) -> Self {
        self.watch = watch;
        self
    }

    pub fn with_fallback_on_timeout(mut self, enabled: bool) -> Self {
        self.fallback_on_timeout = enabled;
        self
    }
}
