//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Attempt sequence for one message:
//!     → rate_limit.rs (sliding-window admission, shared by all backends)
//!     → circuit_breaker.rs (per-backend gate: skip backends that are OPEN)
//!     → timeouts.rs (optional deadline around each send)
//!     → On failure: retries.rs + backoff.rs (wait, then retry same backend)
//! ```
//!
//! # Design Decisions
//! - Circuit breaker is per backend, rate limiter is global
//! - Retry budget is scoped per backend and resets on fail-over
//! - Backoff is deterministic (no jitter); waits go through the injected scheduler

pub mod backoff;
pub mod circuit_breaker;
pub mod rate_limit;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use rate_limit::{RateLimitConfig, SlidingWindowLimiter};
pub use retries::RetryPolicy;
