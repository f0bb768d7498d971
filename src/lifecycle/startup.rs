//! Startup orchestration.
//!
//! # Responsibilities
//! - Build backends, breakers and the dispatcher from a validated config
//! - Start the dispatcher loop and the HTTP listener
//! - Stop both on shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::BackendPool;
use crate::config::{ConfigPatch, RelayConfig};
use crate::dispatch::{DispatchSettings, Dispatcher};
use crate::http::RelayServer;
use crate::lifecycle::Shutdown;
use crate::observability::Journal;
use crate::runtime::{Clock, Scheduler, TokioClock, TokioScheduler};

/// Fully wired relay, ready to serve.
pub struct Relay {
    config: RelayConfig,
    dispatcher: Arc<Dispatcher>,
    journal: Journal,
}

impl Relay {
    /// Wire the relay on the tokio runtime behind `runtime`.
    pub fn build(config: RelayConfig, journal: Journal, runtime: Handle) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
        let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::new(runtime));
        Self::with_runtime(config, journal, clock, scheduler)
    }

    /// Wire the relay with injected time.
    pub fn with_runtime(
        config: RelayConfig,
        journal: Journal,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let pool = BackendPool::from_config(&config.backends, &config.circuit_breaker, scheduler.clone());
        tracing::info!(backends = ?pool.names(), "Backends configured");

        let dispatcher = Arc::new(Dispatcher::new(
            pool,
            DispatchSettings::from_config(&config),
            clock,
            scheduler,
        ));
        Self {
            config,
            dispatcher,
            journal,
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Apply retry and rate-limit settings from every reloaded config.
    pub fn follow_reloads(&self, mut updates: mpsc::UnboundedReceiver<RelayConfig>) -> JoinHandle<()> {
        let dispatcher = self.dispatcher.clone();
        let current = self.config.clone();
        tokio::spawn(async move {
            while let Some(update) = updates.recv().await {
                if update.backends != current.backends || update.listener != current.listener {
                    tracing::warn!("Backend and listener changes take effect after restart");
                }
                let patch = ConfigPatch::from_config(&update.retry, &update.rate_limit);
                match dispatcher.set_config(&patch) {
                    Ok(_) => tracing::info!("Dispatch settings reloaded from config file"),
                    Err(e) => tracing::warn!(error = %e, "Reloaded settings rejected"),
                }
            }
        })
    }

    /// Run the dispatcher loop and HTTP server until `shutdown` fires.
    pub async fn serve(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let interval = Duration::from_millis(self.config.dispatch.tick_interval_ms);
        let dispatch_task = tokio::spawn(self.dispatcher.clone().run(interval, shutdown.subscribe()));

        let server = RelayServer::new(&self.config.listener, self.dispatcher.clone(), self.journal.clone());
        let served = server.run(listener, shutdown.signalled()).await;

        // The server may stop on its own error; make sure the loop follows.
        shutdown.trigger();
        if let Err(e) = dispatch_task.await {
            tracing::error!(error = %e, "Dispatcher task ended abnormally");
        }
        served
    }
}
