//! Engine configuration.
//!
//! [`GeowatchConfig`] groups the `[request]`, `[watch]`, `[fallback]` and
//! `[logging]` sections of `~/.geowatch/config.ini`. Missing files and
//! missing keys fall back to the engine defaults.
//!
//! # Example
//!
//! ```
//! use geowatch::config::GeowatchConfig;
//!
//! let config = GeowatchConfig::default();
//! let coordinator_config = config.coordinator_config();
//! assert!(coordinator_config.request.high_accuracy);
//! ```

mod file;
mod parser;
mod settings;
mod writer;

pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    FallbackSettings, GeowatchConfig, LoggingSettings, RequestSettings, WatchSettings,
};
