//! Exponential backoff.

use std::time::Duration;

/// Delay before retrying after the failed attempt with index `attempt` (0-based).
///
/// `min(base_ms * multiplier^attempt, max_ms)`, saturating.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64, multiplier: f64) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let raw = base_ms as f64 * multiplier.powi(exponent);
    // NaN and overflow both collapse onto the cap.
    let capped = raw.min(max_ms as f64);
    Duration::from_millis(capped as u64)
}
