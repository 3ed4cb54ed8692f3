//! HTTP transport for the IP fallback.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use super::error::FallbackError;

/// Default per-attempt connect and read timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// User-Agent sent with every request.
pub const USER_AGENT: &str = concat!("geowatch/", env!("CARGO_PKG_VERSION"));

/// Boxed future returned by [`HttpFetcher::fetch`].
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;

/// Trait for HTTP GET operations.
///
/// Returns the response body, or `None` on any transport failure or
/// non-success status. Boxed futures keep the trait object-safe so the
/// fallback can hold an `Arc<dyn HttpFetcher>`.
pub trait HttpFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a>;
}

/// Real fetcher backed by an async reqwest client.
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Creates a fetcher with the default 5 s timeout.
    pub fn new() -> Result<Self, FallbackError> {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    /// Creates a fetcher with a custom connect/read timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FallbackError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FallbackError::ClientBuild(e.to_string()))?;

        Ok(Self { client })
    }
}

impl HttpFetcher for ReqwestFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            let response = match self.client.get(url).send().await {
                Ok(response) => response,
                Err(e) => {
                    debug!(url, error = %e, "Request failed");
                    return None;
                }
            };

            if !response.status().is_success() {
                debug!(url, status = %response.status(), "Non-success response");
                return None;
            }

            match response.text().await {
                Ok(body) => Some(body),
                Err(e) => {
                    debug!(url, error = %e, "Failed to read response body");
                    None
                }
            }
        })
    }
}
