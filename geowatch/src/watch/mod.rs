//! Continuous watches.
//!
//! - [`handle`] - watch options, callback trait, per-watch gate and delivery task
//! - [`registry`] - the id-keyed table with replace, clear, pause and resume

mod handle;
mod registry;

pub use handle::{
    WatchCallback, WatchInfo, WatchOptions, WatchPhase, DEFAULT_WATCH_DISTANCE_METERS,
    DEFAULT_WATCH_INTERVAL,
};
pub use registry::WatchRegistry;
