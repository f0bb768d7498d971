//! Dispatch errors.

use thiserror::Error;

use crate::config::ValidationError;

/// Errors returned by dispatcher operations.
///
/// Delivery failures are never surfaced here; they end up in status records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("invalid idempotency key: {0}")]
    InvalidIdempotencyKey(String),

    #[error("invalid settings: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    InvalidSettings(Vec<ValidationError>),
}
