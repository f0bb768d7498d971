//! Backend pool management.
//!
//! # Responsibilities
//! - Hold backends in fixed priority order
//! - Pair each backend with its circuit breaker settings
//! - Build simulated backends from configuration

use std::collections::HashSet;
use std::sync::Arc;

use crate::backend::{Backend, SimulatedBackend};
use crate::config::BackendConfig;
use crate::resilience::CircuitBreakerConfig;
use crate::runtime::Scheduler;

/// A backend and the breaker settings it runs under.
pub struct PoolEntry {
    pub backend: Arc<dyn Backend>,
    pub breaker: CircuitBreakerConfig,
}

/// Ordered set of backends; earlier entries are tried first.
#[derive(Default)]
pub struct BackendPool {
    entries: Vec<PoolEntry>,
}

impl BackendPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build simulated backends from configuration, in declaration order.
    ///
    /// Backends with a duplicate name are skipped.
    pub fn from_config(
        configs: &[BackendConfig],
        default_breaker: &CircuitBreakerConfig,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let mut pool = Self::new();
        let mut seen = HashSet::new();
        for config in configs {
            if !seen.insert(config.name.as_str()) {
                tracing::warn!(backend = %config.name, "Duplicate backend name, skipping");
                continue;
            }
            let breaker = config
                .circuit_breaker
                .clone()
                .unwrap_or_else(|| default_breaker.clone());
            pool.push(Arc::new(SimulatedBackend::new(config, scheduler.clone())), breaker);
        }
        pool
    }

    /// Append a backend with lowest priority.
    pub fn push(&mut self, backend: Arc<dyn Backend>, breaker: CircuitBreakerConfig) {
        tracing::debug!(backend = %backend.name(), priority = self.entries.len(), "Backend registered");
        self.entries.push(PoolEntry { backend, breaker });
    }

    /// Builder-style [`BackendPool::push`].
    pub fn with(mut self, backend: Arc<dyn Backend>, breaker: CircuitBreakerConfig) -> Self {
        self.push(backend, breaker);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.backend.name().to_string()).collect()
    }

    pub fn into_entries(self) -> Vec<PoolEntry> {
        self.entries
    }
}
