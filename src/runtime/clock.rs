//! Clock abstraction.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnixMillis(pub u64);

impl UnixMillis {
    /// Time elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn since(self, earlier: UnixMillis) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }

    pub fn add(self, delay: Duration) -> UnixMillis {
        UnixMillis(self.0.saturating_add(duration_millis(delay)))
    }

    pub fn as_millis(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UnixMillis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Saturating conversion used wherever a `Duration` becomes a millisecond count.
pub(crate) fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> UnixMillis;
}

/// Clock backed by tokio's monotonic `Instant`, anchored to the system time at creation.
///
/// Under `tokio::time::pause` the clock follows tokio's virtual time.
#[derive(Debug, Clone)]
pub struct TokioClock {
    base: UnixMillis,
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        let base = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(duration_millis)
            .unwrap_or_default();
        Self {
            base: UnixMillis(base),
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> UnixMillis {
        self.base.add(self.origin.elapsed())
    }
}
