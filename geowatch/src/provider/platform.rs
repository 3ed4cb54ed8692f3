//! Collaborator contracts supplied by the host platform.
//!
//! The engine never talks to positioning hardware or the OS permission
//! system directly. Instead the host implements:
//!
//! - [`PermissionOracle`] - authoritative permission/service booleans
//! - [`LocationPlatform`] - per-provider availability, cached fixes and
//!   push subscriptions

use std::time::Duration;

use thiserror::Error;

use super::sink::SubscriptionSinks;
use crate::reading::{ProviderId, Reading};

/// Opaque identifier of one platform subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(pub(crate) u64);

impl SubscriptionToken {
    /// Raw numeric value (stable for the lifetime of the pool).
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Delivery throttling requested from the platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateParams {
    /// Minimum time between two updates.
    pub min_interval: Duration,
    /// Minimum movement between two updates.
    pub min_distance_meters: f64,
}

impl UpdateParams {
    pub fn new(min_interval: Duration, min_distance_meters: f64) -> Self {
        Self {
            min_interval,
            min_distance_meters,
        }
    }
}

/// Errors a platform may raise when asked to start a subscription.
///
/// These never reach callers: the pool logs them and treats the provider as
/// unavailable for the current attempt.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlatformError {
    /// The platform refused the request.
    #[error("provider {provider} rejected subscription: {reason}")]
    Rejected { provider: ProviderId, reason: String },

    /// Permission was revoked between the precondition check and the request.
    #[error("permission revoked while subscribing to {0}")]
    PermissionRevoked(ProviderId),

    /// The provider disappeared between the enabled check and the request.
    #[error("provider {0} was removed")]
    ProviderRemoved(ProviderId),
}

/// Permission and service state, re-checked on every request.
pub trait PermissionOracle: Send + Sync {
    /// Whether the application holds a location permission.
    fn has_permission(&self) -> bool;

    /// Whether the device location service is switched on.
    fn is_service_enabled(&self) -> bool;
}

/// Platform positioning API.
///
/// Implementations push readings into the [`ReadingSink`](super::ReadingSink)
/// and status changes into the [`LifecycleSink`](super::LifecycleSink) handed
/// over in [`subscribe`](LocationPlatform::subscribe), from any thread and
/// on their own schedule, until [`unsubscribe`](LocationPlatform::unsubscribe)
/// is called with the subscription's token.
pub trait LocationPlatform: Send + Sync {
    /// Whether the provider is currently switched on.
    fn is_provider_enabled(&self, provider: ProviderId) -> bool;

    /// Most recent fix the platform has cached for the provider.
    fn last_known_reading(&self, provider: ProviderId) -> Option<Reading>;

    /// Start delivering updates from `provider` into `sinks`.
    ///
    /// `token` identifies the subscription in a later
    /// [`unsubscribe`](LocationPlatform::unsubscribe) call; it is the same
    /// token both sinks carry.
    fn subscribe(
        &self,
        token: SubscriptionToken,
        provider: ProviderId,
        params: UpdateParams,
        sinks: SubscriptionSinks,
    ) -> Result<(), PlatformError>;

    /// Stop delivering updates for the subscription identified by `token`.
    ///
    /// Unknown tokens are ignored.
    fn unsubscribe(&self, token: SubscriptionToken);
}
