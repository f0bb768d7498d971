//! resilient-relay server.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tracing::Level;

use resilient_relay::config::{load_config, validate_config, ConfigError, ConfigWatcher, RelayConfig};
use resilient_relay::lifecycle::{wait_for_signal, Relay, Shutdown};
use resilient_relay::observability::{init_logging, metrics, Journal};
use resilient_relay::runtime::TokioClock;

#[derive(Parser)]
#[command(name = "resilient-relay", version)]
#[command(about = "Queue-backed message relay with retries, circuit breakers and rate limiting")]
struct Args {
    /// TOML configuration file. Watched for retry / rate-limit changes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    let journal = Journal::new(config.observability.journal_capacity);
    init_logging(
        &config.observability,
        Some(journal.layer(Arc::new(TokioClock::new()), Level::INFO)),
    )?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "resilient-relay starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        tick_interval_ms = config.dispatch.tick_interval_ms,
        max_attempts = config.retry.max_attempts,
        rate_limit_max = config.rate_limit.max,
        rate_limit_window_ms = config.rate_limit.window_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let relay = Relay::build(config, journal, Handle::current());

    // Held for the lifetime of the process; dropping it stops watching.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            let handle = watcher.run()?;
            relay.follow_reloads(updates);
            Some(handle)
        }
        None => None,
    };

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(signal) => {
                tracing::info!(signal, listeners = trigger.receiver_count(), "Shutdown signal received");
                trigger.trigger();
            }
            Err(e) => tracing::error!(error = %e, "Failed to install signal handlers"),
        }
    });

    relay.serve(listener, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
