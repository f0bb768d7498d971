//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! relay.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, all errors at once)
//!     → RelayConfig (validated)
//!     → main wires listener, backends, dispatcher
//!
//! At runtime:
//!     POST /api/settings or watcher.rs reload
//!     → patch.rs (ConfigPatch, partial retry / rate-limit update)
//!     → validation.rs (same range checks)
//!     → Dispatcher swaps its settings atomically
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Backends are fixed at startup; only dispatch settings are live

pub mod loader;
pub mod patch;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use patch::{ConfigPatch, RateLimitPatch, RetryPatch};
pub use schema::{BackendConfig, DispatchConfig, ListenerConfig, LogFormat, ObservabilityConfig, RelayConfig};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
