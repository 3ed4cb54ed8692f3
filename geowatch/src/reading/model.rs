//! Core reading types.
//!
//! - [`ProviderId`] - Which position source produced a reading
//! - [`Reading`] - Immutable, timestamped position sample
//! - [`IpPlace`] - Coarse place metadata attached to IP-derived readings

use serde::{Deserialize, Serialize};

/// Identifies a position source.
///
/// The declaration order is the trust priority (GPS > Network > Passive > IP).
/// It is only ever used to break ties, for example to decide the order in
/// which providers are consulted; it never overrides the arbiter's
/// age/accuracy rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Satellite positioning.
    Gps,
    /// Cell/Wi-Fi network positioning.
    Network,
    /// Piggy-backs on fixes requested by other applications.
    Passive,
    /// IP-geolocation web service (last resort).
    Ip,
}

impl ProviderId {
    /// Device providers in trust-priority order.
    ///
    /// IP is not a platform provider: it is reached through the fallback
    /// collaborator instead.
    pub const DEVICE: [ProviderId; 3] = [ProviderId::Gps, ProviderId::Network, ProviderId::Passive];

    /// Short lowercase name used in reports and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Gps => "gps",
            ProviderId::Network => "network",
            ProviderId::Passive => "passive",
            ProviderId::Ip => "ip",
        }
    }

    /// Returns true for providers backed by the device platform.
    pub fn is_device(&self) -> bool {
        !matches!(self, ProviderId::Ip)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Place metadata returned by IP-geolocation services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpPlace {
    pub ip: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
}

/// A timestamped position sample tagged with its source and accuracy.
///
/// Readings are immutable once built: fields are private and only exposed
/// through accessors. Optional kinematic fields stay `None` unless the
/// source actually supplied them.
///
/// # Example
///
/// ```
/// use geowatch::reading::{ProviderId, Reading};
///
/// let reading = Reading::new(ProviderId::Gps, 53.55, 9.99, 5.0, 1_700_000_000_000)
///     .with_altitude(12.0)
///     .with_speed(1.5);
///
/// assert_eq!(reading.source(), ProviderId::Gps);
/// assert_eq!(reading.altitude(), Some(12.0));
/// assert!(reading.heading().is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    latitude: f64,
    longitude: f64,
    accuracy_meters: f64,
    altitude: Option<f64>,
    speed: Option<f64>,
    heading: Option<f64>,
    timestamp_millis: u64,
    source: ProviderId,
    place: Option<IpPlace>,
}

impl Reading {
    /// Accuracy reported for every IP-derived reading (10 km).
    pub const IP_ACCURACY_METERS: f64 = 10_000.0;

    /// Create a reading with the required fields.
    pub fn new(
        source: ProviderId,
        latitude: f64,
        longitude: f64,
        accuracy_meters: f64,
        timestamp_millis: u64,
    ) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_meters,
            altitude: None,
            speed: None,
            heading: None,
            timestamp_millis,
            source,
            place: None,
        }
    }

    /// Create an IP-derived reading with the fixed IP accuracy.
    pub fn from_ip(latitude: f64, longitude: f64, timestamp_millis: u64, place: IpPlace) -> Self {
        Self {
            place: Some(place),
            ..Self::new(
                ProviderId::Ip,
                latitude,
                longitude,
                Self::IP_ACCURACY_METERS,
                timestamp_millis,
            )
        }
    }

    /// Attach an altitude in meters.
    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    /// Attach a ground speed in meters per second.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Attach a heading in degrees.
    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Horizontal accuracy radius in meters (lower is better).
    pub fn accuracy_meters(&self) -> f64 {
        self.accuracy_meters
    }

    pub fn altitude(&self) -> Option<f64> {
        self.altitude
    }

    pub fn speed(&self) -> Option<f64> {
        self.speed
    }

    pub fn heading(&self) -> Option<f64> {
        self.heading
    }

    /// Wall-clock time of the fix, in milliseconds since the Unix epoch.
    pub fn timestamp_millis(&self) -> u64 {
        self.timestamp_millis
    }

    pub fn source(&self) -> ProviderId {
        self.source
    }

    /// Place metadata (IP readings only).
    pub fn place(&self) -> Option<&IpPlace> {
        self.place.as_ref()
    }
}
