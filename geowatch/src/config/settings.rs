//! Configuration settings structs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::coordinator::{CoordinatorConfig, RequestOptions};
use crate::fallback::{
    Endpoint, HttpFetcher, IpFallback, ResponseFormat, DEFAULT_FETCH_TIMEOUT,
    DEFAULT_PRIMARY_URL, DEFAULT_PUBLIC_IP_URLS, DEFAULT_SECONDARY_URL,
};
use crate::watch::WatchOptions;

/// Full engine configuration as loaded from `config.ini`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeowatchConfig {
    pub request: RequestSettings,
    pub watch: WatchSettings,
    pub fallback: FallbackSettings,
    pub logging: LoggingSettings,
}

/// `[request]` - one-shot defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSettings {
    pub timeout: Duration,
    pub high_accuracy: bool,
    pub min_interval: Duration,
    pub min_distance_meters: f64,
}

impl Default for RequestSettings {
    fn default() -> Self {
        let options = RequestOptions::default();
        Self {
            timeout: options.timeout,
            high_accuracy: options.high_accuracy,
            min_interval: options.min_interval,
            min_distance_meters: options.min_distance_meters,
        }
    }
}

impl RequestSettings {
    pub fn to_options(&self) -> RequestOptions {
        RequestOptions::default()
            .with_timeout(self.timeout)
            .with_high_accuracy(self.high_accuracy)
            .with_min_interval(self.min_interval)
            .with_min_distance(self.min_distance_meters)
    }
}

/// `[watch]` - continuous watch defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchSettings {
    pub min_interval: Duration,
    pub min_distance_meters: f64,
    pub high_accuracy: bool,
}

impl Default for WatchSettings {
    fn default() -> Self {
        let options = WatchOptions::default();
        Self {
            min_interval: options.min_interval,
            min_distance_meters: options.min_distance_meters,
            high_accuracy: options.high_accuracy,
        }
    }
}

impl WatchSettings {
    pub fn to_options(&self) -> WatchOptions {
        WatchOptions::default()
            .with_min_interval(self.min_interval)
            .with_min_distance(self.min_distance_meters)
            .with_high_accuracy(self.high_accuracy)
    }
}

/// `[fallback]` - IP-geolocation last resort.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackSettings {
    pub enabled: bool,
    pub primary_url: String,
    pub primary_format: ResponseFormat,
    pub secondary_url: String,
    pub secondary_format: ResponseFormat,
    /// Per-attempt connect/read timeout.
    pub timeout: Duration,
    /// Also try the fallback when a one-shot times out with nothing cached.
    pub on_timeout: bool,
    pub public_ip_urls: Vec<String>,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            primary_url: DEFAULT_PRIMARY_URL.to_string(),
            primary_format: ResponseFormat::IpApi,
            secondary_url: DEFAULT_SECONDARY_URL.to_string(),
            secondary_format: ResponseFormat::IpApiCo,
            timeout: DEFAULT_FETCH_TIMEOUT,
            on_timeout: false,
            public_ip_urls: DEFAULT_PUBLIC_IP_URLS.iter().map(|u| u.to_string()).collect(),
        }
    }
}

impl FallbackSettings {
    /// Primary then secondary endpoint.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        vec![
            Endpoint::new(self.primary_url.clone(), self.primary_format),
            Endpoint::new(self.secondary_url.clone(), self.secondary_format),
        ]
    }

    /// Build the fallback over `fetcher`, or `None` when disabled.
    pub fn build(&self, fetcher: Arc<dyn HttpFetcher>) -> Option<IpFallback> {
        if !self.enabled {
            return None;
        }
        Some(IpFallback::new(fetcher, self.endpoints()).with_public_ip_urls(self.public_ip_urls.clone()))
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
    /// Filter used when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: super::file::config_directory().join("logs"),
            file: crate::logging::default_log_file().to_string(),
            level: crate::logging::DEFAULT_LEVEL.to_string(),
        }
    }
}

impl GeowatchConfig {
    /// Coordinator behaviour derived from these settings.
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig::default()
            .with_request(self.request.to_options())
            .with_watch(self.watch.to_options())
            .with_fallback_on_timeout(self.fallback.enabled && self.fallback.on_timeout)
    }
}
