//! Quality arbiter - decides whether a candidate reading beats the current one.
//!
//! # Selection Logic
//!
//! 1. Anything beats nothing; nothing never beats anything
//! 2. A reading more than 60 s newer wins outright
//! 3. A reading more than 60 s older loses outright
//! 4. Inside the 60 s window, a more accurate reading wins
//! 5. Inside the window, a reading from the *same* provider that is at most
//!    200 m less accurate also wins (continuity tolerance)
//!
//! The rules trade age against accuracy, so the relation is not transitive
//! in edge cases. Both thresholds are part of the contract.
//!
//! # Example
//!
//! ```
//! use geowatch::arbiter::is_better;
//! use geowatch::reading::{ProviderId, Reading};
//!
//! let gps = Reading::new(ProviderId::Gps, 53.5, 10.0, 5.0, 0);
//! let network = Reading::new(ProviderId::Network, 53.5, 10.0, 50.0, 500);
//!
//! assert!(is_better(Some(&gps), None));
//! assert!(!is_better(Some(&network), Some(&gps)));
//! ```

use crate::reading::Reading;

/// Age difference beyond which the newer reading always wins (exclusive).
pub const SIGNIFICANT_AGE_DELTA_MILLIS: i128 = 60_000;

/// Accuracy loss tolerated for a reading from the same provider.
pub const SAME_PROVIDER_ACCURACY_TOLERANCE_METERS: f64 = 200.0;

/// Returns true if `candidate` should replace `current`.
pub fn is_better(candidate: Option<&Reading>, current: Option<&Reading>) -> bool {
    let Some(candidate) = candidate else {
        return false;
    };
    let Some(current) = current else {
        return true;
    };

    let age_delta =
        i128::from(candidate.timestamp_millis()) - i128::from(current.timestamp_millis());
    if age_delta > SIGNIFICANT_AGE_DELTA_MILLIS {
        return true;
    }
    if age_delta < -SIGNIFICANT_AGE_DELTA_MILLIS {
        return false;
    }

    let accuracy_delta = candidate.accuracy_meters() - current.accuracy_meters();
    if accuracy_delta < 0.0 {
        return true;
    }

    candidate.source() == current.source()
        && accuracy_delta <= SAME_PROVIDER_ACCURACY_TOLERANCE_METERS
}

/// Pick the best of several readings.
///
/// Readings are considered in trust-priority order (GPS first), each one
/// replacing the running winner when [`is_better`] says so. Priority only
/// decides the visiting order; the age and accuracy rules decide the winner.
pub fn best_of<'a, I>(readings: I) -> Option<&'a Reading>
where
    I: IntoIterator<Item = &'a Reading>,
{
    let mut ordered: Vec<&Reading> = readings.into_iter().collect();
    ordered.sort_by_key(|r| r.source());

    ordered.into_iter().fold(None, |best, candidate| {
        if is_better(Some(candidate), best) {
            Some(candidate)
        } else {
            best
        }
    })
}
