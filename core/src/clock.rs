//! Wall-clock helpers.

use chrono::Utc;

/// Milliseconds since the Unix epoch; zero if the clock reads before 1970.
pub fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}
