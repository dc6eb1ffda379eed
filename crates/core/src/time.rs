//! Wall-clock helpers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp in milliseconds
///
/// A clock set before the Unix epoch reads as zero rather than panicking.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Milliseconds elapsed between `then` and `now`, saturating at zero.
pub fn age_ms(now: u64, then: u64) -> u64 {
    now.saturating_sub(then)
}
