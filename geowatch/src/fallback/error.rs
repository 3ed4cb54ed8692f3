//! IP fallback errors.
//!
//! None of these reach callers of the engine. They are logged while the
//! fallback moves on to the next endpoint; only the aggregate outcome
//! (a reading, or nothing) is reported.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FallbackError {
    /// Connection, timeout or non-success HTTP status.
    #[error("request to {url} failed")]
    Transport { url: String },

    /// The endpoint answered with something unusable.
    #[error("malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },

    /// No echo service produced a valid public IPv4 address.
    #[error("public IP address could not be determined")]
    PublicIpUnavailable,

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),
}
