//! INI parsing logic for converting `Ini` -> `GeowatchConfig`.
//!
//! The single place where INI key names are mapped to struct fields.
//! Durations are written in milliseconds, distances in meters.

use std::path::PathBuf;
use std::time::Duration;

use ini::{Ini, Properties};

use super::file::ConfigFileError;
use super::settings::GeowatchConfig;
use crate::fallback::ResponseFormat;

/// Parse an `Ini` object into a `GeowatchConfig`.
///
/// Starts from `GeowatchConfig::default()` and overlays any values found.
pub(super) fn parse_ini(ini: &Ini) -> Result<GeowatchConfig, ConfigFileError> {
    let mut config = GeowatchConfig::default();

    // [request] section
    if let Some(section) = ini.section(Some("request")) {
        let s = Section::new("request", section);
        if let Some(v) = s.millis("timeout_ms", true)? {
            config.request.timeout = v;
        }
        if let Some(v) = s.boolean("high_accuracy")? {
            config.request.high_accuracy = v;
        }
        if let Some(v) = s.millis("min_interval_ms", false)? {
            config.request.min_interval = v;
        }
        if let Some(v) = s.meters("min_distance_m")? {
            config.request.min_distance_meters = v;
        }
    }

    // [watch] section
    if let Some(section) = ini.section(Some("watch")) {
        let s = Section::new("watch", section);
        if let Some(v) = s.millis("min_interval_ms", false)? {
            config.watch.min_interval = v;
        }
        if let Some(v) = s.meters("min_distance_m")? {
            config.watch.min_distance_meters = v;
        }
        if let Some(v) = s.boolean("high_accuracy")? {
            config.watch.high_accuracy = v;
        }
    }

    // [fallback] section
    if let Some(section) = ini.section(Some("fallback")) {
        let s = Section::new("fallback", section);
        if let Some(v) = s.boolean("enabled")? {
            config.fallback.enabled = v;
        }
        if let Some(v) = s.url("primary_url")? {
            config.fallback.primary_url = v;
        }
        if let Some(v) = s.format("primary_format")? {
            config.fallback.primary_format = v;
        }
        if let Some(v) = s.url("secondary_url")? {
            config.fallback.secondary_url = v;
        }
        if let Some(v) = s.format("secondary_format")? {
            config.fallback.secondary_format = v;
        }
        if let Some(v) = s.millis("timeout_ms", true)? {
            config.fallback.timeout = v;
        }
        if let Some(v) = s.boolean("on_timeout")? {
            config.fallback.on_timeout = v;
        }
        if let Some(v) = section.get("public_ip_urls") {
            let urls: Vec<String> = v
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect();
            if let Some(bad) = urls.iter().find(|u| !is_http_url(u)) {
                return Err(s.invalid("public_ip_urls", v, format!("'{bad}' is not an http(s) URL")));
            }
            config.fallback.public_ip_urls = urls;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
        if let Some(v) = section.get("level") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.level = v.to_string();
            }
        }
    }

    Ok(config)
}

/// Typed accessors over one INI section.
struct Section<'a> {
    name: &'static str,
    props: &'a Properties,
}

impl<'a> Section<'a> {
    fn new(name: &'static str, props: &'a Properties) -> Self {
        Self { name, props }
    }

    fn invalid(&self, key: &str, value: &str, reason: impl Into<String>) -> ConfigFileError {
        ConfigFileError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    fn boolean(&self, key: &str) -> Result<Option<bool>, ConfigFileError> {
        let Some(v) = self.props.get(key) else {
            return Ok(None);
        };
        match v.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(Some(true)),
            "false" | "no" | "off" | "0" => Ok(Some(false)),
            _ => Err(self.invalid(key, v, "must be true or false")),
        }
    }

    fn millis(&self, key: &str, positive: bool) -> Result<Option<Duration>, ConfigFileError> {
        let Some(v) = self.props.get(key) else {
            return Ok(None);
        };
        let millis: u64 = v
            .trim()
            .parse()
            .map_err(|_| self.invalid(key, v, "must be a whole number of milliseconds"))?;
        if positive && millis == 0 {
            return Err(self.invalid(key, v, "must be greater than zero"));
        }
        Ok(Some(Duration::from_millis(millis)))
    }

    fn meters(&self, key: &str) -> Result<Option<f64>, ConfigFileError> {
        let Some(v) = self.props.get(key) else {
            return Ok(None);
        };
        let meters: f64 = v
            .trim()
            .parse()
            .map_err(|_| self.invalid(key, v, "must be a number of meters"))?;
        if !meters.is_finite() || meters < 0.0 {
            return Err(self.invalid(key, v, "must be a non-negative number of meters"));
        }
        Ok(Some(meters))
    }

    fn url(&self, key: &str) -> Result<Option<String>, ConfigFileError> {
        let Some(v) = self.props.get(key) else {
            return Ok(None);
        };
        let v = v.trim();
        if !is_http_url(v) {
            return Err(self.invalid(key, v, "must start with http:// or https://"));
        }
        Ok(Some(v.to_string()))
    }

    fn format(&self, key: &str) -> Result<Option<ResponseFormat>, ConfigFileError> {
        let Some(v) = self.props.get(key) else {
            return Ok(None);
        };
        v.parse()
            .map(Some)
            .map_err(|reason: String| self.invalid(key, v, reason))
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<GeowatchConfig, ConfigFileError> {
        let ini = Ini::load_from_str(content).unwrap();
        parse_ini(&ini)
    }

    #[test]
    fn test_empty_ini_is_defaults() {
        assert_eq!(parse("").unwrap(), GeowatchConfig::default());
    }

    #[test]
    fn test_request_and_watch_overrides() {
        let config = parse(
            r#"
[request]
timeout_ms = 2500
high_accuracy = false
min_interval_ms = 0
min_distance_m = 0

[watch]
min_interval_ms = 1000
min_distance_m = 3.5
high_accuracy = no
"#,
        )
        .unwrap();

        assert_eq!(config.request.timeout, Duration::from_millis(2500));
        assert!(!config.request.high_accuracy);
        assert_eq!(config.request.min_interval, Duration::ZERO);
        assert_eq!(config.watch.min_distance_meters, 3.5);
        assert!(!config.watch.high_accuracy);
    }

    #[test]
    fn test_fallback_overrides() {
        let config = parse(
            r#"
[fallback]
enabled = true
primary_url = https://ipinfo.io/json
primary_format = ipinfo
secondary_url = https://ipapi.co/{ip}/json/
on_timeout = true
public_ip_urls = https://api.ipify.org, http://4.ipw.cn
"#,
        )
        .unwrap();

        assert_eq!(config.fallback.primary_format, ResponseFormat::IpInfo);
        assert_eq!(config.fallback.secondary_url, "https://ipapi.co/{ip}/json/");
        assert_eq!(config.fallback.secondary_format, ResponseFormat::IpApiCo);
        assert!(config.fallback.on_timeout);
        assert_eq!(
            config.fallback.public_ip_urls,
            vec!["https://api.ipify.org", "http://4.ipw.cn"]
        );
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = parse("[request]\ntimeout_ms = 0\n").unwrap_err();
        match err {
            ConfigFileError::InvalidValue { section, key, .. } => {
                assert_eq!(section, "request");
                assert_eq!(key, "timeout_ms");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(parse("[watch]\nhigh_accuracy = maybe\n").is_err());
        assert!(parse("[watch]\nmin_distance_m = -1\n").is_err());
        assert!(parse("[request]\nmin_interval_ms = soon\n").is_err());
        assert!(parse("[fallback]\nprimary_url = ftp://example.com\n").is_err());
        assert!(parse("[fallback]\nsecondary_format = geoip\n").is_err());
        assert!(parse("[fallback]\npublic_ip_urls = http://ok, nope\n").is_err());
    }

    #[test]
    fn test_logging_section() {
        let config = parse("[logging]\ndirectory = /tmp/geo\nfile = run.log\nlevel = debug\n").unwrap();
        assert_eq!(config.logging.directory, PathBuf::from("/tmp/geo"));
        assert_eq!(config.logging.file, "run.log");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_expand_tilde_plain_path() {
        assert_eq!(expand_tilde("/var/log"), PathBuf::from("/var/log"));
    }
}
