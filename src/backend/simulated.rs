//! Simulated backend with random latency and failures.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::backend::{Backend, DeliveryError};
use crate::config::BackendConfig;
use crate::dispatch::Message;
use crate::runtime::Scheduler;

/// Backend that fails with a fixed probability after a random delay.
pub struct SimulatedBackend {
    name: String,
    failure_rate: f64,
    min_latency_ms: u64,
    max_latency_ms: u64,
    scheduler: Arc<dyn Scheduler>,
}

impl SimulatedBackend {
    pub fn new(config: &BackendConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            name: config.name.clone(),
            failure_rate: config.failure_rate.clamp(0.0, 1.0),
            min_latency_ms: config.min_latency_ms.min(config.max_latency_ms),
            max_latency_ms: config.max_latency_ms.max(config.min_latency_ms),
            scheduler,
        }
    }
}

#[async_trait]
impl Backend for SimulatedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: &Message) -> Result<(), DeliveryError> {
        let latency = rand::thread_rng().gen_range(self.min_latency_ms..=self.max_latency_ms);
        self.scheduler.sleep(Duration::from_millis(latency)).await;

        if rand::thread_rng().gen_bool(self.failure_rate) {
            return Err(DeliveryError::Unavailable(format!(
                "{} failed to send message",
                self.name
            )));
        }

        tracing::debug!(
            backend = %self.name,
            recipient = %message.recipient,
            latency_ms = latency,
            "Simulated delivery accepted"
        );
        Ok(())
    }
}
