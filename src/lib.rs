//! Resilient message relay.
//!
//! Accepts outbound messages, queues them, and delivers them through an
//! ordered set of unreliable backends with retries, exponential backoff,
//! per-backend circuit breakers and a global sliding-window rate limit.
//!
//! # Architecture Overview
//!
//! ```text
//!   POST /api/send ──▶ http ──▶ dispatch::Dispatcher::submit ──▶ DeliveryQueue
//!                                                                     │
//!   tick (interval / resume timer) ──▶ Dispatcher::tick ◀─────────────┘
//!        │
//!        ├─▶ resilience::SlidingWindowLimiter (admit or defer)
//!        ├─▶ resilience::CircuitBreaker (skip open backends)
//!        ├─▶ backend::Backend::send (with deadline, retries, backoff)
//!        └─▶ StatusRecord::apply (queued → retrying → sent | failed)
//!
//!   Cross-cutting: config (TOML + reload), observability (tracing, journal,
//!   metrics), runtime (injectable clock and timers), lifecycle (shutdown)
//! ```

// Core subsystems
pub mod backend;
pub mod dispatch;
pub mod http;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod runtime;

pub use config::RelayConfig;
pub use dispatch::{Dispatcher, Message, MessageId};
pub use http::RelayServer;
pub use lifecycle::{Relay, Shutdown};
