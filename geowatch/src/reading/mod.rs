//! Position readings and the caller-visible report shape.
//!
//! - [`model`] - `Reading`, `ProviderId`, `IpPlace`
//! - [`report`] - `PositionReport`, the serializable record returned to callers

mod model;
mod report;

pub use model::{IpPlace, ProviderId, Reading};
pub use report::{Coords, PositionReport};
