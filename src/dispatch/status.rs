//! Delivery status records and their transitions.
//!
//! # State Transitions
//! ```text
//! queued   → retrying: an attempt failed
//! retrying → retrying: another attempt failed
//! queued   → sent:     delivered on the first attempt
//! retrying → sent:     a later attempt succeeded
//! *        → failed:   every backend exhausted its attempts
//! ```
//!
//! [`StatusRecord::apply`] is total: every event yields a record, whatever
//! the prior status.

use serde::Serialize;

use crate::dispatch::{Message, MessageId};
use crate::runtime::UnixMillis;

/// Lifecycle status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Queued,
    Retrying,
    Sent,
    Failed,
}

/// Something that happened to a message during an attempt sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    /// A single attempt against `backend` failed. `attempt` is zero-based.
    AttemptFailed {
        backend: String,
        attempt: u32,
        error: String,
        at: UnixMillis,
    },
    /// `backend` accepted the message on zero-based `attempt`.
    Delivered {
        backend: String,
        attempt: u32,
        at: UnixMillis,
    },
    /// Every backend was tried (or skipped) without success.
    Exhausted { attempts: u32, at: UnixMillis },
}

/// Last known state of a message, as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusRecord {
    pub id: MessageId,
    #[serde(flatten)]
    pub message: Message,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub backend: Option<String>,
    pub last_error: Option<String>,
    /// Time of the most recent transition.
    pub timestamp: UnixMillis,
}

pub const EXHAUSTED_ERROR: &str = "all backends failed";

impl StatusRecord {
    pub fn queued(id: MessageId, message: Message, at: UnixMillis) -> Self {
        Self {
            id,
            message,
            status: DeliveryStatus::Queued,
            attempts: 0,
            backend: None,
            last_error: None,
            timestamp: at,
        }
    }

    /// Record after `event`.
    pub fn apply(self, event: &StatusEvent) -> Self {
        match event {
            StatusEvent::AttemptFailed {
                backend,
                attempt,
                error,
                at,
            } => Self {
                status: DeliveryStatus::Retrying,
                attempts: attempt + 1,
                backend: Some(backend.clone()),
                last_error: Some(error.clone()),
                timestamp: *at,
                ..self
            },
            StatusEvent::Delivered {
                backend,
                attempt,
                at,
            } => Self {
                status: DeliveryStatus::Sent,
                attempts: attempt + 1,
                backend: Some(backend.clone()),
                last_error: None,
                timestamp: *at,
                ..self
            },
            StatusEvent::Exhausted { attempts, at } => Self {
                status: DeliveryStatus::Failed,
                attempts: *attempts,
                backend: None,
                last_error: Some(EXHAUSTED_ERROR.to_string()),
                timestamp: *at,
                ..self
            },
        }
    }
}
