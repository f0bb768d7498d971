//! Dispatch core.
//!
//! # Data Flow
//! ```text
//! submit(message, key?)
//!     → message.rs (derive MessageId: key or content digest)
//!     → queue.rs (dedupe, append QueueItem, create `queued` StatusRecord)
//!
//! Dispatcher::tick (one at a time)
//!     → rate limiter admission (deny → arm single resume timer)
//!     → attempt sequence over backends (breaker gate, retries, backoff)
//!     → status.rs (StatusRecord::apply for every outcome)
//!     → queue.rs (pop head; keep `sent` history, drop `failed` records)
//! ```
//!
//! # Design Decisions
//! - Only the queue head is processed; FIFO order is preserved
//! - A busy guard makes overlapping attempt sequences impossible
//! - Cancellation never touches the message currently in flight

pub mod error;
pub mod message;
pub mod orchestrator;
pub mod queue;
pub mod status;

pub use error::DispatchError;
pub use message::{Message, MessageId};
pub use orchestrator::{DispatchSettings, Dispatcher, TickOutcome};
pub use queue::{DeliveryQueue, QueueEntryView, QueueItem, RemoveOutcome, SubmitReceipt, SubmitStatus};
pub use status::{DeliveryStatus, StatusEvent, StatusRecord};
