//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → backends + breakers → Dispatcher → HTTP listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop ticking → stop accepting → drain → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: an attempt sequence already in flight is allowed to finish
//! - Queue contents are in memory only and are lost on exit

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
pub use startup::Relay;
