//! Wall-clock helpers.

use chrono::Utc;

/// Milliseconds since the Unix epoch, clamped at zero.
pub fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}
