//! IP-geolocation fallback.
//!
//! Last resort when no device provider can serve a one-shot request. The
//! configured endpoints are queried in order (primary, then secondary); the
//! first usable answer becomes a [`Reading`] with source
//! [`ProviderId::Ip`](crate::reading::ProviderId::Ip) and a fixed accuracy of
//! 10 km.
//!
//! Endpoint URLs may contain an `{ip}` placeholder. The public IPv4 address
//! is then discovered once per lookup through the echo services.
//!
//! Transport and parse failures are logged and never surfaced.

mod endpoint;
mod error;
mod http;

use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::reading::Reading;
use crate::time;

pub use endpoint::{Endpoint, ParsedLocation, ResponseFormat, IP_PLACEHOLDER};
pub use error::FallbackError;
pub use http::{FetchFuture, HttpFetcher, ReqwestFetcher, DEFAULT_FETCH_TIMEOUT, USER_AGENT};

/// Default primary endpoint (ip-api.com).
///
/// Both defaults locate the caller's own address, so a lookup with the
/// defaults makes no public-IP discovery request.
pub const DEFAULT_PRIMARY_URL: &str =
    "http://ip-api.com/json/?fields=status,message,country,regionName,city,lat,lon,query";

/// Default secondary endpoint (ipapi.co).
pub const DEFAULT_SECONDARY_URL: &str = "https://ipapi.co/json/";

/// Default public-IP echo services, tried in order.
pub const DEFAULT_PUBLIC_IP_URLS: [&str; 2] = ["http://4.ipw.cn", "https://api.ipify.org"];

/// Returns true for a dotted-quad IPv4 address.
pub fn is_valid_ipv4(candidate: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();

    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^((25[0-5]|2[0-4]\d|[01]?\d\d?)\.){3}(25[0-5]|2[0-4]\d|[01]?\d\d?)$").unwrap()
    });
    pattern.is_match(candidate)
}

/// Ordered list of IP-geolocation endpoints behind one fetcher.
pub struct IpFallback {
    fetcher: Arc<dyn HttpFetcher>,
    endpoints: Vec<Endpoint>,
    public_ip_urls: Vec<String>,
}

impl IpFallback {
    /// Fallback over `endpoints`, tried in order.
    pub fn new(fetcher: Arc<dyn HttpFetcher>, endpoints: Vec<Endpoint>) -> Self {
        Self {
            fetcher,
            endpoints,
            public_ip_urls: DEFAULT_PUBLIC_IP_URLS.iter().map(|u| u.to_string()).collect(),
        }
    }

    /// Fallback over the default ip-api.com / ipapi.co pair.
    pub fn with_defaults(fetcher: Arc<dyn HttpFetcher>) -> Self {
        Self::new(
            fetcher,
            vec![
                Endpoint::new(DEFAULT_PRIMARY_URL, ResponseFormat::IpApi),
                Endpoint::new(DEFAULT_SECONDARY_URL, ResponseFormat::IpApiCo),
            ],
        )
    }

    pub fn with_public_ip_urls(mut self, urls: Vec<String>) -> Self {
        self.public_ip_urls = urls;
        self
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Locate by IP. `None` if every endpoint failed.
    pub async fn locate(&self) -> Option<Reading> {
        // Discovered lazily, at most once per lookup
        let mut public_ip: Option<Option<String>> = None;

        for endpoint in &self.endpoints {
            match self.try_endpoint(endpoint, &mut public_ip).await {
                Ok(reading) => {
                    info!(
                        url = %endpoint.url,
                        format = %endpoint.format,
                        city = reading.place().and_then(|p| p.city.as_deref()).unwrap_or("-"),
                        "IP location resolved"
                    );
                    return Some(reading);
                }
                Err(e) => {
                    warn!(url = %endpoint.url, error = %e, "IP location endpoint failed");
                }
            }
        }

        warn!(endpoints = self.endpoints.len(), "All IP location endpoints failed");
        None
    }

    /// Discover the public IPv4 address through the echo services.
    pub async fn public_ip(&self) -> Result<String, FallbackError> {
        for url in &self.public_ip_urls {
            let Some(body) = self.fetcher.fetch(url).await else {
                debug!(url = %url, "Public IP service unreachable");
                continue;
            };
            let candidate = body.trim();
            if is_valid_ipv4(candidate) {
                debug!(url = %url, ip = candidate, "Public IP discovered");
                return Ok(candidate.to_string());
            }
            debug!(url = %url, "Public IP service returned an invalid address");
        }
        Err(FallbackError::PublicIpUnavailable)
    }

    async fn try_endpoint(
        &self,
        endpoint: &Endpoint,
        public_ip: &mut Option<Option<String>>,
    ) -> Result<Reading, FallbackError> {
        let url = if endpoint.needs_public_ip() {
            if public_ip.is_none() {
                *public_ip = Some(self.public_ip().await.ok());
            }
            match public_ip.as_ref() {
                Some(Some(ip)) => endpoint.url_for(ip),
                _ => return Err(FallbackError::PublicIpUnavailable),
            }
        } else {
            endpoint.url.clone()
        };

        let body = self
            .fetcher
            .fetch(&url)
            .await
            .ok_or_else(|| FallbackError::Transport { url: url.clone() })?;
        let parsed = endpoint.parse(&body)?;

        Ok(Reading::from_ip(
            parsed.latitude,
            parsed.longitude,
            time::now_millis(),
            parsed.place,
        ))
    }
}

impl std::fmt::Debug for IpFallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpFallback")
            .field("endpoints", &self.endpoints)
            .field("public_ip_urls", &self.public_ip_urls)
            .finish_non_exhaustive()
    }
}
