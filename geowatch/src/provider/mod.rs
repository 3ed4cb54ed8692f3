//! Device providers and the platform boundary.
//!
//! - [`platform`] - collaborator traits the host implements
//! - [`sink`] - reading and lifecycle sinks handed to the platform
//! - [`pool`] - enabled-provider discovery and subscription bookkeeping
//! - [`memory`] - hand-driven platform used by tests and the simulator

mod memory;
mod platform;
mod pool;
mod sink;

pub use memory::InMemoryPlatform;
pub use platform::{
    LocationPlatform, PermissionOracle, PlatformError, SubscriptionToken, UpdateParams,
};
pub use pool::{PoolError, ProviderPool, Subscription, SubscriptionOwner, SubscriptionSet};
pub use sink::{
    LifecycleEvent, LifecycleSink, ProviderEvent, ProviderStatus, ReadingSink, SubscriptionSinks,
};
