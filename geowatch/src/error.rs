//! Caller-visible failure taxonomy.

use thiserror::Error;

/// Why a position request failed.
///
/// Precondition failures (`PermissionDenied`, `ServiceUnavailable`) are
/// reported before any subscription is attempted. `NoProviderAvailable` and
/// `Timeout` are distinct: the first means nothing could even be asked, the
/// second means something was asked and never answered in time.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq, Hash)]
pub enum LocateError {
    /// The application holds no location permission.
    #[error("location permission denied")]
    PermissionDenied,

    /// The location service is off, or no device provider is enabled.
    #[error("location service unavailable")]
    ServiceUnavailable,

    /// No provider could be subscribed and the IP fallback failed too.
    #[error("no location provider available")]
    NoProviderAvailable,

    /// The deadline elapsed without a reading.
    #[error("timed out waiting for a position")]
    Timeout,
}

impl LocateError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            LocateError::PermissionDenied => "permission_denied",
            LocateError::ServiceUnavailable => "service_unavailable",
            LocateError::NoProviderAvailable => "no_provider_available",
            LocateError::Timeout => "timeout",
        }
    }
}
