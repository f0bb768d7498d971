//! HTTP management API.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum router, request ID, timeout, body limit, trace)
//!     → handlers.rs (validate input, call Dispatcher / Journal)
//!     → error.rs (ApiError → JSON error body)
//! ```
//!
//! # Design Decisions
//! - Handlers never block on delivery; submit only enqueues
//! - Every error response is `{"error": ...}` JSON

pub mod error;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, RelayServer, X_REQUEST_ID};
