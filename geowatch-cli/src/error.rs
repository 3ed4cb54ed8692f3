//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::process;

use geowatch::config::ConfigFileError;
use geowatch::fallback::FallbackError;
use geowatch::LocateError;
use thiserror::Error;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug, Error)]
pub enum CliError {
    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// Configuration file could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigFileError),

    /// Tokio runtime could not be started
    #[error("Failed to start async runtime: {0}")]
    Runtime(std::io::Error),

    /// The engine refused or failed a request
    #[error("Position request failed: {0}")]
    Locate(#[from] LocateError),

    /// HTTP client for the IP fallback could not be built
    #[error("IP fallback error: {0}")]
    Fallback(#[from] FallbackError),

    #[error("IP fallback is disabled in the configuration")]
    FallbackDisabled,

    #[error("No IP location endpoint returned a usable answer")]
    IpLocationFailed,

    /// Report could not be serialized
    #[error("Failed to encode report: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Config(ConfigFileError::InvalidValue { .. }) => {
                eprintln!();
                eprintln!("Check the file with: geowatch config --path");
                eprintln!("Remove the offending key to fall back to its default.");
            }
            CliError::FallbackDisabled => {
                eprintln!();
                eprintln!("Set enabled = true in the [fallback] section to use this command.");
            }
            CliError::IpLocationFailed => {
                eprintln!();
                eprintln!("Common issues:");
                eprintln!("  1. No network connection");
                eprintln!("  2. Endpoint rate limit reached (ipapi.co allows ~1000 requests/day)");
                eprintln!("  3. Wrong response format configured for a custom endpoint");
            }
            _ => {}
        }

        process::exit(1)
    }
}
