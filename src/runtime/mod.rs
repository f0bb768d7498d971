//! Time and scheduling capabilities.
//!
//! # Data Flow
//! ```text
//! Dispatcher / CircuitBreaker / SlidingWindowLimiter
//!     → clock.rs (Clock::now for timestamps and window pruning)
//!     → scheduler.rs (Scheduler::after for one-shot timers,
//!                     Scheduler::sleep for backoff waits)
//!
//! Production: TokioClock + TokioScheduler (tokio timer wheel)
//! Tests:      VirtualTime (manual clock, fires timers on advance)
//! ```
//!
//! # Design Decisions
//! - Nothing in the core reads wall-clock time directly
//! - Timers are one-shot and cancellable through a shared handle
//! - `sleep` is derived from `after`, so one capability drives every wait

pub mod clock;
pub mod scheduler;

pub use clock::{Clock, TokioClock, UnixMillis};
pub use scheduler::{Scheduler, Task, TimerHandle, TokioScheduler, VirtualTime};
