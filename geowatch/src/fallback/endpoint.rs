//! IP-geolocation endpoints and their response formats.

use std::str::FromStr;

use serde::Deserialize;

use super::error::FallbackError;
use crate::reading::IpPlace;

/// Placeholder replaced by the public IP address in endpoint URLs.
pub const IP_PLACEHOLDER: &str = "{ip}";

/// JSON shape returned by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// `ip-api.com`: `{status, lat, lon, country, regionName, city, query}`
    IpApi,
    /// `ipapi.co`: `{latitude, longitude, country_name, region, city, ip}`
    IpApiCo,
    /// `ipinfo.io`: `{loc: "lat,lon", ip, city, region, country}`
    IpInfo,
}

impl ResponseFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseFormat::IpApi => "ip-api",
            ResponseFormat::IpApiCo => "ipapi-co",
            ResponseFormat::IpInfo => "ipinfo",
        }
    }
}

impl std::fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ip-api" => Ok(ResponseFormat::IpApi),
            "ipapi-co" => Ok(ResponseFormat::IpApiCo),
            "ipinfo" => Ok(ResponseFormat::IpInfo),
            other => Err(format!(
                "unknown response format '{other}' (expected ip-api, ipapi-co or ipinfo)"
            )),
        }
    }
}

/// Coordinates and place parsed from an endpoint response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub place: IpPlace,
}

/// One IP-geolocation service.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub url: String,
    pub format: ResponseFormat,
}

impl Endpoint {
    pub fn new(url: impl Into<String>, format: ResponseFormat) -> Self {
        Self {
            url: url.into(),
            format,
        }
    }

    /// Whether the URL needs the public IP address substituted in.
    pub fn needs_public_ip(&self) -> bool {
        self.url.contains(IP_PLACEHOLDER)
    }

    /// URL with the placeholder replaced by `ip`.
    pub fn url_for(&self, ip: &str) -> String {
        self.url.replace(IP_PLACEHOLDER, ip)
    }

    /// Parse a response body according to this endpoint's format.
    pub fn parse(&self, body: &str) -> Result<ParsedLocation, FallbackError> {
        let malformed = |reason: String| FallbackError::Malformed {
            url: self.url.clone(),
            reason,
        };

        let parsed = match self.format {
            ResponseFormat::IpApi => {
                let body: IpApiBody =
                    serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;
                if body.status.as_deref() != Some("success") {
                    return Err(malformed(format!(
                        "status {}: {}",
                        body.status.as_deref().unwrap_or("missing"),
                        body.message.as_deref().unwrap_or("no message")
                    )));
                }
                ParsedLocation {
                    latitude: body.lat.ok_or_else(|| malformed("missing lat".into()))?,
                    longitude: body.lon.ok_or_else(|| malformed("missing lon".into()))?,
                    place: IpPlace {
                        ip: body.query,
                        city: body.city,
                        region: body.region_name,
                        country: body.country,
                    },
                }
            }
            ResponseFormat::IpApiCo => {
                let body: IpApiCoBody =
                    serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;
                if body.error.unwrap_or(false) {
                    return Err(malformed(
                        body.reason.unwrap_or_else(|| "error flag set".to_string()),
                    ));
                }
                ParsedLocation {
                    latitude: body
                        .latitude
                        .ok_or_else(|| malformed("missing latitude".into()))?,
                    longitude: body
                        .longitude
                        .ok_or_else(|| malformed("missing longitude".into()))?,
                    place: IpPlace {
                        ip: body.ip,
                        city: body.city,
                        region: body.region,
                        country: body.country_name,
                    },
                }
            }
            ResponseFormat::IpInfo => {
                let body: IpInfoBody =
                    serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;
                let loc = body.loc.ok_or_else(|| malformed("missing loc".into()))?;
                let (latitude, longitude) =
                    parse_loc(&loc).ok_or_else(|| malformed(format!("bad loc '{loc}'")))?;
                ParsedLocation {
                    latitude,
                    longitude,
                    place: IpPlace {
                        ip: body.ip,
                        city: body.city,
                        region: body.region,
                        country: body.country,
                    },
                }
            }
        };

        if !(-90.0..=90.0).contains(&parsed.latitude)
            || !(-180.0..=180.0).contains(&parsed.longitude)
        {
            return Err(malformed(format!(
                "coordinates out of range ({}, {})",
                parsed.latitude, parsed.longitude
            )));
        }
        Ok(parsed)
    }
}

fn parse_loc(loc: &str) -> Option<(f64, f64)> {
    let (lat, lon) = loc.split_once(',')?;
    Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?))
}

#[derive(Deserialize)]
struct IpApiBody {
    status: Option<String>,
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    country: Option<String>,
    #[serde(rename = "regionName")]
    region_name: Option<String>,
    city: Option<String>,
    query: Option<String>,
}

#[derive(Deserialize)]
struct IpApiCoBody {
    latitude: Option<f64>,
    longitude: Option<f64>,
    country_name: Option<String>,
    region: Option<String>,
    city: Option<String>,
    ip: Option<String>,
    error: Option<bool>,
    reason: Option<String>,
}

#[derive(Deserialize)]
struct IpInfoBody {
    loc: Option<String>,
    ip: Option<String>,
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
}
