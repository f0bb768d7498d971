//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_attempts_total` (counter): send attempts by backend
//! - `relay_attempt_failures_total` (counter): failed attempts by backend
//! - `relay_delivered_total` (counter): delivered messages by backend
//! - `relay_exhausted_total` (counter): messages dropped after every backend failed
//! - `relay_duplicates_total` (counter): submissions ignored as duplicates
//! - `relay_rate_limit_deferrals_total` (counter): ticks deferred by the rate limit
//! - `relay_queue_depth` (gauge): messages waiting
//! - `relay_circuit_state` (gauge): 0=closed, 1=half-open, 2=open, by backend
//!
//! # Design Decisions
//! - Recording is a no-op until [`init_metrics`] installs the exporter
//! - Backend name is the only label

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::resilience::CircuitState;

/// Install the Prometheus exporter listening on `addr`. Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe();
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn describe() {
    describe_counter!("relay_attempts_total", "Send attempts by backend");
    describe_counter!("relay_attempt_failures_total", "Failed send attempts by backend");
    describe_counter!("relay_delivered_total", "Messages delivered by backend");
    describe_counter!("relay_exhausted_total", "Messages dropped after every backend failed");
    describe_counter!("relay_duplicates_total", "Submissions ignored as duplicates");
    describe_counter!("relay_rate_limit_deferrals_total", "Ticks deferred by the rate limit");
    describe_gauge!("relay_queue_depth", "Messages waiting for delivery");
    describe_gauge!("relay_circuit_state", "Breaker state: 0=closed, 1=half-open, 2=open");
}

pub fn record_attempt(backend: &str) {
    counter!("relay_attempts_total", "backend" => backend.to_string()).increment(1);
}

pub fn record_attempt_failure(backend: &str) {
    counter!("relay_attempt_failures_total", "backend" => backend.to_string()).increment(1);
}

pub fn record_delivery(backend: &str) {
    counter!("relay_delivered_total", "backend" => backend.to_string()).increment(1);
}

pub fn record_exhausted() {
    counter!("relay_exhausted_total").increment(1);
}

pub fn record_duplicate() {
    counter!("relay_duplicates_total").increment(1);
}

pub fn record_deferral() {
    counter!("relay_rate_limit_deferrals_total").increment(1);
}

pub fn record_queue_depth(depth: usize) {
    gauge!("relay_queue_depth").set(depth as f64);
}

pub fn record_breaker_state(backend: &str, state: CircuitState) {
    gauge!("relay_circuit_state", "backend" => backend.to_string()).set(state.as_gauge());
}
