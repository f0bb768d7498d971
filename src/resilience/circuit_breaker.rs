//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, attempts pass through
//! - Open: backend assumed down, attempts are skipped
//! - Half-Open: probing whether the backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= max_failures
//! Open → Half-Open: reset timer fires (one-shot, armed when opening)
//! Half-Open → Closed: probe attempt succeeds
//! Half-Open → Open: probe attempt fails (failure count is already past threshold)
//! ```
//!
//! # Design Decisions
//! - One breaker per backend, driven only by that backend's outcomes
//! - The reset timer is armed once per opening; failures while Open do not re-arm it
//! - A success closes the breaker and cancels any pending reset timer

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::observability::metrics;
use crate::runtime::{Clock, Scheduler, TimerHandle, UnixMillis};

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub max_failures: u32,

    /// How long the circuit stays open before probing again (milliseconds).
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 3,
            reset_timeout_ms: 60_000,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    #[serde(rename = "CLOSED")]
    Closed,
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "HALF-OPEN")]
    HalfOpen,
}

impl CircuitState {
    /// Gauge encoding: 0=closed, 1=half-open, 2=open.
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF-OPEN",
        })
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failures: u32,
    pub last_failure_time: Option<UnixMillis>,
}

#[derive(Debug)]
struct BreakerData {
    state: CircuitState,
    failures: u32,
    last_failure_time: Option<UnixMillis>,
    reset_timer: Option<TimerHandle>,
}

/// Per-backend fault gate.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    data: Arc<Mutex<BreakerData>>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("data", &*self.data.lock())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            data: Arc::new(Mutex::new(BreakerData {
                state: CircuitState::Closed,
                failures: 0,
                last_failure_time: None,
                reset_timer: None,
            })),
            clock,
            scheduler,
        }
    }

    /// Whether an attempt may be made. False only while Open.
    pub fn can_attempt(&self) -> bool {
        self.data.lock().state != CircuitState::Open
    }

    pub fn state(&self) -> CircuitState {
        self.data.lock().state
    }

    /// Record a successful delivery.
    ///
    /// Returns `true` if the breaker recovered from Open or Half-Open.
    pub fn on_success(&self) -> bool {
        let mut data = self.data.lock();
        let recovered = data.state != CircuitState::Closed;
        data.failures = 0;
        data.state = CircuitState::Closed;
        data.last_failure_time = None;
        if let Some(timer) = data.reset_timer.take() {
            timer.cancel();
        }
        drop(data);

        if recovered {
            tracing::info!(backend = %self.name, "Circuit breaker CLOSED - backend recovered");
            metrics::record_breaker_state(&self.name, CircuitState::Closed);
        }
        recovered
    }

    /// Record a failed delivery.
    ///
    /// Returns `true` if this failure opened the circuit.
    pub fn on_failure(&self) -> bool {
        let now = self.clock.now();
        let mut data = self.data.lock();
        data.failures = data.failures.saturating_add(1);
        data.last_failure_time = Some(now);

        if data.failures < self.config.max_failures || data.state == CircuitState::Open {
            return false;
        }

        let previous = data.state;
        data.state = CircuitState::Open;
        data.reset_timer = Some(self.arm_reset_timer());
        let failures = data.failures;
        drop(data);

        tracing::warn!(
            backend = %self.name,
            failures,
            threshold = self.config.max_failures,
            reset_timeout_ms = self.config.reset_timeout_ms,
            from = %previous,
            "Circuit breaker OPENED - skipping backend until reset timeout"
        );
        metrics::record_breaker_state(&self.name, CircuitState::Open);
        true
    }

    /// Current state and counters.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let data = self.data.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: data.state,
            failures: data.failures,
            last_failure_time: data.last_failure_time,
        }
    }

    fn arm_reset_timer(&self) -> TimerHandle {
        let data: Weak<Mutex<BreakerData>> = Arc::downgrade(&self.data);
        let name = self.name.clone();
        self.scheduler.after(
            self.config.reset_timeout(),
            Box::new(move || {
                let Some(data) = data.upgrade() else {
                    return;
                };
                let mut data = data.lock();
                data.reset_timer = None;
                if data.state == CircuitState::Open {
                    data.state = CircuitState::HalfOpen;
                    drop(data);
                    tracing::info!(backend = %name, "Circuit breaker entering HALF-OPEN state - probing recovery");
                    metrics::record_breaker_state(&name, CircuitState::HalfOpen);
                }
            }),
        )
    }
}
