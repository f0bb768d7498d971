//! Retry policy.
//!
//! # Design Decisions
//! - `max_attempts` is a per-backend budget; moving to the next backend starts over at 0
//! - An exhausted message reports `max_attempts * backend_count` attempts, even when
//!   some backends were skipped by an open breaker

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::backoff::calculate_backoff;

/// Retry and backoff settings applied to each backend in turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per backend before failing over.
    pub max_attempts: u32,

    /// Delay after the first failed attempt, in milliseconds.
    pub base_delay_ms: u64,

    /// Upper bound on any single backoff, in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor between consecutive backoffs.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Wait after the failed attempt `attempt` before trying the same backend again.
    pub fn delay(&self, attempt: u32) -> Duration {
        calculate_backoff(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
            self.backoff_multiplier,
        )
    }

    /// Whether another attempt on the same backend follows attempt `attempt`.
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) < self.max_attempts
    }

    /// Attempt count reported when every backend has been exhausted.
    pub fn exhausted_attempts(&self, backend_count: usize) -> u32 {
        let backends = u32::try_from(backend_count).unwrap_or(u32::MAX);
        self.max_attempts.saturating_mul(backends)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay_ms, 1000);
        assert_eq!(policy.max_delay_ms, 10_000);
        assert!((policy.backoff_multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_has_next() {
        let policy = RetryPolicy {
            max_attempts: 2,
            ..RetryPolicy::default()
        };
        assert!(policy.has_next(0));
        assert!(!policy.has_next(1));
        assert!(!policy.has_next(u32::MAX));
    }

    #[test]
    fn test_delay_sequence() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 500,
            backoff_multiplier: 3.0,
        };
        let delays: Vec<u64> = (0..4).map(|i| policy.delay(i).as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 300, 500, 500]);
    }

    #[test]
    fn test_exhausted_attempts() {
        let policy = RetryPolicy {
            max_attempts: 2,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.exhausted_attempts(2), 4);
        assert_eq!(policy.exhausted_attempts(0), 0);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let policy: RetryPolicy = toml::from_str("max_attempts = 7").unwrap();
        assert_eq!(policy.max_attempts, 7);
        assert_eq!(policy.base_delay_ms, 1000);
    }
}
