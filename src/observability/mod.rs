//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured fields: id, backend, attempt, ...)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → logging.rs (stdout, pretty or JSON)
//!     → journal.rs (bounded in-memory history, served at /api/logs)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - The journal is a tracing layer, so every log call feeds it for free
//! - Metric calls are no-ops until an exporter is installed
//! - `RUST_LOG` overrides the configured level

pub mod journal;
pub mod logging;
pub mod metrics;

pub use journal::{Journal, JournalEntry, JournalLayer};
pub use logging::init_logging;
