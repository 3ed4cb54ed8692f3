//! INI serialization logic for converting `GeowatchConfig` -> INI string.

use std::time::Duration;

use super::settings::GeowatchConfig;

/// Convert a `GeowatchConfig` to a commented INI string.
pub(super) fn to_config_string(config: &GeowatchConfig) -> String {
    format!(
        r#"[request]
; One-shot position requests.
; Deadline from subscription to first reading, in milliseconds
timeout_ms = {request_timeout}
; true = GPS only
high_accuracy = {request_high_accuracy}
min_interval_ms = {request_interval}
min_distance_m = {request_distance}

[watch]
; Continuous watches.
min_interval_ms = {watch_interval}
min_distance_m = {watch_distance}
high_accuracy = {watch_high_accuracy}

[fallback]
; IP geolocation, used when no device provider can be subscribed.
enabled = {fallback_enabled}
; Formats: ip-api, ipapi-co, ipinfo. URLs may contain {{ip}}.
primary_url = {primary_url}
primary_format = {primary_format}
secondary_url = {secondary_url}
secondary_format = {secondary_format}
; Per-attempt connect/read timeout, in milliseconds
timeout_ms = {fallback_timeout}
; Also try IP geolocation when a one-shot times out
on_timeout = {on_timeout}
; Public IP echo services, comma separated, tried in order
public_ip_urls = {public_ip_urls}

[logging]
directory = {log_dir}
file = {log_file}
; Used when RUST_LOG is not set
level = {log_level}
"#,
        request_timeout = millis(config.request.timeout),
        request_high_accuracy = config.request.high_accuracy,
        request_interval = millis(config.request.min_interval),
        request_distance = config.request.min_distance_meters,
        watch_interval = millis(config.watch.min_interval),
        watch_distance = config.watch.min_distance_meters,
        watch_high_accuracy = config.watch.high_accuracy,
        fallback_enabled = config.fallback.enabled,
        primary_url = config.fallback.primary_url,
        primary_format = config.fallback.primary_format,
        secondary_url = config.fallback.secondary_url,
        secondary_format = config.fallback.secondary_format,
        fallback_timeout = millis(config.fallback.timeout),
        on_timeout = config.fallback.on_timeout,
        public_ip_urls = config.fallback.public_ip_urls.join(", "),
        log_dir = config.logging.directory.display(),
        log_file = config.logging.file,
        log_level = config.logging.level,
    )
}

fn millis(duration: Duration) -> u128 {
    duration.as_millis()
}
