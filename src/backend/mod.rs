//! Delivery backends.
//!
//! # Data Flow
//! ```text
//! config.backends (priority order)
//!     → pool.rs (build backends + per-backend breaker settings)
//!     → Dispatcher walks the pool in order for every message
//!     → Backend::send(message) → Ok | DeliveryError
//! ```
//!
//! # Design Decisions
//! - Backends are opaque capabilities; protocol details stay behind `send`
//! - `send` must tolerate repeated calls for the same message (retries)
//! - Priority is the configured order, never reshuffled at runtime

pub mod pool;
pub mod simulated;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::dispatch::Message;

pub use pool::{BackendPool, PoolEntry};
pub use simulated::SimulatedBackend;

/// A single failed delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The backend refused the message.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The backend could not be reached or is failing.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The send did not finish before its deadline.
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// Capability to deliver a message.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Stable name used in status records and logs.
    fn name(&self) -> &str;

    /// Attempt delivery once.
    async fn send(&self, message: &Message) -> Result<(), DeliveryError>;
}
