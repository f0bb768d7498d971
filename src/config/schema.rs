//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files.
//! Every section has defaults, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::resilience::{CircuitBreakerConfig, RateLimitConfig, RetryPolicy};

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// HTTP listener settings.
    pub listener: ListenerConfig,

    /// Queue processing cadence.
    pub dispatch: DispatchConfig,

    /// Per-backend retry budget and backoff.
    pub retry: RetryPolicy,

    /// Global attempt throughput cap.
    pub rate_limit: RateLimitConfig,

    /// Default breaker settings for backends without their own.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Backends in priority order.
    pub backends: Vec<BackendConfig>,

    pub observability: ObservabilityConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            dispatch: DispatchConfig::default(),
            retry: RetryPolicy::default(),
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            backends: vec![
                BackendConfig::simulated("backend-1", 0.2),
                BackendConfig::simulated("backend-2", 0.4),
            ],
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:3000").
    pub bind_address: String,

    /// Per-request timeout for API calls, in seconds.
    pub request_timeout_secs: u64,

    /// Largest accepted request body, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
            request_timeout_secs: 30,
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Queue processing configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Interval between queue ticks, in milliseconds.
    pub tick_interval_ms: u64,

    /// Deadline for a single backend send. Unbounded when absent.
    pub send_timeout_ms: Option<u64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            send_timeout_ms: None,
        }
    }
}

/// Simulated backend definition.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BackendConfig {
    /// Unique backend name, reported in status records.
    pub name: String,

    /// Probability in [0, 1] that a send fails.
    #[serde(default = "default_failure_rate")]
    pub failure_rate: f64,

    #[serde(default = "default_min_latency_ms")]
    pub min_latency_ms: u64,

    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: u64,

    /// Overrides the top-level breaker settings for this backend.
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl BackendConfig {
    pub fn simulated(name: &str, failure_rate: f64) -> Self {
        Self {
            name: name.to_string(),
            failure_rate,
            min_latency_ms: default_min_latency_ms(),
            max_latency_ms: default_max_latency_ms(),
            circuit_breaker: None,
        }
    }
}

fn default_failure_rate() -> f64 {
    0.3
}

fn default_min_latency_ms() -> u64 {
    100
}

fn default_max_latency_ms() -> u64 {
    400
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Entries kept in the in-memory log journal served at `/api/logs`.
    pub journal_capacity: usize,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            journal_capacity: 500,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
