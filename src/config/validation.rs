//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (attempts >= 1, windows > 0, rates within [0, 1])
//! - Detect duplicate backend names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Runtime settings patches go through the same range checks as files

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::RelayConfig;
use crate::resilience::{CircuitBreakerConfig, RateLimitConfig, RetryPolicy};

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check a whole configuration.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = validate_settings(&config.retry, &config.rate_limit);

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.dispatch.tick_interval_ms == 0 {
        errors.push(ValidationError::new("dispatch.tick_interval_ms", "must be greater than 0"));
    }
    if config.dispatch.send_timeout_ms == Some(0) {
        errors.push(ValidationError::new("dispatch.send_timeout_ms", "must be greater than 0 when set"));
    }

    check_breaker("circuit_breaker", &config.circuit_breaker, &mut errors);

    if config.backends.is_empty() {
        errors.push(ValidationError::new("backends", "at least one backend is required"));
    }
    let mut names = HashSet::new();
    for (i, backend) in config.backends.iter().enumerate() {
        let field = format!("backends[{i}]");
        if backend.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{field}.name"), "cannot be empty"));
        } else if !names.insert(backend.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{field}.name"),
                format!("duplicate backend name '{}'", backend.name),
            ));
        }
        if !(0.0..=1.0).contains(&backend.failure_rate) {
            errors.push(ValidationError::new(
                format!("{field}.failure_rate"),
                "must be between 0 and 1",
            ));
        }
        if backend.min_latency_ms > backend.max_latency_ms {
            errors.push(ValidationError::new(
                format!("{field}.min_latency_ms"),
                "cannot exceed max_latency_ms",
            ));
        }
        if let Some(breaker) = &backend.circuit_breaker {
            check_breaker(&format!("{field}.circuit_breaker"), breaker, &mut errors);
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }
    if config.observability.journal_capacity == 0 {
        errors.push(ValidationError::new("observability.journal_capacity", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Range checks for the runtime-adjustable settings.
pub fn validate_settings(retry: &RetryPolicy, rate_limit: &RateLimitConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if retry.max_attempts == 0 {
        errors.push(ValidationError::new("retry.max_attempts", "must be at least 1"));
    }
    if retry.max_delay_ms < retry.base_delay_ms {
        errors.push(ValidationError::new("retry.max_delay_ms", "cannot be less than base_delay_ms"));
    }
    if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
        errors.push(ValidationError::new("retry.backoff_multiplier", "must be a finite number >= 1"));
    }
    if rate_limit.max == 0 {
        errors.push(ValidationError::new("rate_limit.max", "must be at least 1"));
    }
    if rate_limit.window_ms == 0 {
        errors.push(ValidationError::new("rate_limit.window_ms", "must be greater than 0"));
    }

    errors
}

fn check_breaker(field: &str, breaker: &CircuitBreakerConfig, errors: &mut Vec<ValidationError>) {
    if breaker.max_failures == 0 {
        errors.push(ValidationError::new(format!("{field}.max_failures"), "must be at least 1"));
    }
    if breaker.reset_timeout_ms == 0 {
        errors.push(ValidationError::new(format!("{field}.reset_timeout_ms"), "must be greater than 0"));
    }
}
