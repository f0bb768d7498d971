//! Sliding-window admission control shared by every backend.
//!
//! # Algorithm
//! - Every admitted attempt records its timestamp
//! - Timestamps older than `window_ms` are pruned lazily on each check
//! - An admission is allowed while fewer than `max` timestamps remain
//!
//! # Example
//! ```text
//! max = 5, window = 60s
//! t=0s..1s:  five admissions succeed
//! t=2s:      sixth is denied, retry_after = 58s
//! t=60s:     first timestamp ages out, admission succeeds again
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::runtime::UnixMillis;

/// Configuration for the global throughput cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Attempts allowed per window.
    pub max: u32,

    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max: 5,
            window_ms: 60_000,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Sliding-window limiter.
#[derive(Debug, Clone)]
pub struct SlidingWindowLimiter {
    config: RateLimitConfig,
    admitted: VecDeque<UnixMillis>,
}

impl SlidingWindowLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            admitted: VecDeque::new(),
        }
    }

    /// Replace limits. Recorded timestamps are kept and judged against the new window.
    pub fn reconfigure(&mut self, config: RateLimitConfig) {
        self.config = config;
    }

    /// Admit and record an event if the window has room.
    pub fn try_admit(&mut self, now: UnixMillis) -> bool {
        self.prune(now);
        if self.admitted.len() < self.capacity() {
            self.admitted.push_back(now);
            true
        } else {
            false
        }
    }

    /// Record an event without checking capacity.
    pub fn record(&mut self, now: UnixMillis) {
        self.prune(now);
        self.admitted.push_back(now);
    }

    /// Give back a slot recorded at `at` that was never used.
    pub fn release(&mut self, at: UnixMillis) {
        if let Some(pos) = self.admitted.iter().rposition(|t| *t == at) {
            self.admitted.remove(pos);
        }
    }

    /// Events currently counted against the window.
    pub fn in_window(&mut self, now: UnixMillis) -> usize {
        self.prune(now);
        self.admitted.len()
    }

    /// Time until `try_admit` can succeed; zero if it already can.
    pub fn retry_after(&mut self, now: UnixMillis) -> Duration {
        self.prune(now);
        let len = self.admitted.len();
        let capacity = self.capacity();
        if len < capacity {
            return Duration::ZERO;
        }
        // With exactly `max` entries this is the oldest one; unchecked records
        // can push the count above `max`, so wait for enough of them to expire.
        let blocking = self
            .admitted
            .get(len - capacity)
            .copied()
            .unwrap_or(now);
        self.config.window().saturating_sub(now.since(blocking))
    }

    fn capacity(&self) -> usize {
        usize::try_from(self.config.max).unwrap_or(usize::MAX)
    }

    fn prune(&mut self, now: UnixMillis) {
        let window = self.config.window();
        while let Some(oldest) = self.admitted.front() {
            if now.since(*oldest) >= window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }
}
