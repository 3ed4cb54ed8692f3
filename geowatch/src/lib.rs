//! geowatch - location provider arbitration.
//!
//! Turns several unreliable position sources (GPS, network, passive and an
//! IP-geolocation web service) into one-shot answers and continuous
//! streams.
//!
//! - [`reading`] - readings, provider ids and the caller-visible report
//! - [`arbiter`] - decides whether one reading beats another
//! - [`provider`] - the platform boundary and the provider pool
//! - [`watch`] - continuous watches and their registry
//! - [`coordinator`] - one-shot and continuous request flows
//! - [`fallback`] - IP-geolocation last resort
//! - [`config`], [`logging`] - ambient configuration and tracing setup
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use geowatch::coordinator::{Coordinator, CoordinatorConfig, RequestOptions};
//! use geowatch::provider::InMemoryPlatform;
//! use geowatch::reading::{ProviderId, Reading};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let platform = Arc::new(InMemoryPlatform::new());
//! platform.set_last_known(Reading::new(ProviderId::Network, 53.55, 9.99, 35.0, 0));
//!
//! let coordinator = Coordinator::new(platform.clone(), platform, CoordinatorConfig::default());
//! let reading = coordinator.get_current_position(RequestOptions::default()).await.unwrap();
//! assert_eq!(reading.source(), ProviderId::Network);
//! # });
//! ```

pub mod arbiter;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fallback;
pub mod logging;
pub mod provider;
pub mod reading;
pub mod time;
pub mod watch;

pub use coordinator::Coordinator;
pub use error::LocateError;
