//! Caller-visible position report.
//!
//! A [`Reading`] is surfaced to requesters as a structured record:
//!
//! ```text
//! {
//!   "coords": { "latitude": .., "longitude": .., "accuracy": .., ["altitude"], ["speed"], ["heading"] },
//!   "timestamp": <millis>,
//!   "provider": "gps" | "network" | "passive" | "ip",
//!   ["ip"], ["city"], ["region"], ["country"]
//! }
//! ```
//!
//! Optional fields are omitted when the source did not supply them; they are
//! never zero-filled.

use serde::Serialize;

use super::model::{ProviderId, Reading};

/// Coordinate group of a [`PositionReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coords {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
}

/// Structured record handed to callers for every resolved or streamed reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionReport {
    pub coords: Coords,
    pub timestamp: u64,
    pub provider: ProviderId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl PositionReport {
    /// Serialize to a compact JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&Reading> for PositionReport {
    fn from(reading: &Reading) -> Self {
        let place = reading.place().cloned().unwrap_or_default();
        Self {
            coords: Coords {
                latitude: reading.latitude(),
                longitude: reading.longitude(),
                accuracy: reading.accuracy_meters(),
                altitude: reading.altitude(),
                speed: reading.speed(),
                heading: reading.heading(),
            },
            timestamp: reading.timestamp_millis(),
            provider: reading.source(),
            ip: place.ip,
            city: place.city,
            region: place.region,
            country: place.country,
        }
    }
}

impl From<Reading> for PositionReport {
    fn from(reading: Reading) -> Self {
        Self::from(&reading)
    }
}
