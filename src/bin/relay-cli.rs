use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Map, Value};

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Management CLI for the resilient relay", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:3000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check relay liveness
    Health,
    /// Submit a message for delivery
    Send {
        #[arg(long)]
        to: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        body: String,
        /// Idempotency key; defaults to a digest of the message
        #[arg(long)]
        key: Option<String>,
    },
    /// List delivery status records
    Status {
        /// Show a single message
        id: Option<String>,
    },
    /// List queued messages
    Queue,
    /// Show circuit breaker state per backend
    Backends,
    /// Show recent log entries
    Logs {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Show current dispatch settings
    Settings,
    /// Update retry and rate-limit settings
    Set {
        #[arg(long)]
        max_attempts: Option<u32>,
        #[arg(long)]
        base_delay_ms: Option<u64>,
        #[arg(long)]
        max_delay_ms: Option<u64>,
        #[arg(long)]
        backoff_multiplier: Option<f64>,
        #[arg(long)]
        rate_limit_max: Option<u32>,
        #[arg(long)]
        rate_limit_window_ms: Option<u64>,
    },
    /// Stop processing the queue
    Pause,
    /// Resume processing the queue
    Resume,
    /// Drop every message still waiting in queued status
    Clear,
    /// Remove one message from the queue
    Remove { id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Health => client.get(format!("{base}/health")).send().await?,
        Commands::Send {
            to,
            from,
            subject,
            body,
            key,
        } => {
            let mut headers = HeaderMap::new();
            if let Some(key) = key {
                headers.insert("idempotency-key", HeaderValue::from_str(&key)?);
            }
            client
                .post(format!("{base}/api/send"))
                .headers(headers)
                .json(&json!({
                    "recipient": to,
                    "sender": from,
                    "subject": subject,
                    "body": body,
                }))
                .send()
                .await?
        }
        Commands::Status { id: Some(id) } => client.get(format!("{base}/api/status/{id}")).send().await?,
        Commands::Status { id: None } => client.get(format!("{base}/api/status")).send().await?,
        Commands::Queue => client.get(format!("{base}/api/queue")).send().await?,
        Commands::Backends => client.get(format!("{base}/api/backends")).send().await?,
        Commands::Logs { limit } => {
            client
                .get(format!("{base}/api/logs"))
                .query(&[("limit", limit)])
                .send()
                .await?
        }
        Commands::Settings => client.get(format!("{base}/api/settings")).send().await?,
        Commands::Set {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
            backoff_multiplier,
            rate_limit_max,
            rate_limit_window_ms,
        } => {
            let retry = present(&[
                ("max_attempts", max_attempts.map(Value::from)),
                ("base_delay_ms", base_delay_ms.map(Value::from)),
                ("max_delay_ms", max_delay_ms.map(Value::from)),
                ("backoff_multiplier", backoff_multiplier.map(Value::from)),
            ]);
            let rate_limit = present(&[
                ("max", rate_limit_max.map(Value::from)),
                ("window_ms", rate_limit_window_ms.map(Value::from)),
            ]);
            let mut patch = Map::new();
            if !retry.is_empty() {
                patch.insert("retry".into(), Value::Object(retry));
            }
            if !rate_limit.is_empty() {
                patch.insert("rate_limit".into(), Value::Object(rate_limit));
            }
            client
                .post(format!("{base}/api/settings"))
                .json(&Value::Object(patch))
                .send()
                .await?
        }
        Commands::Pause => client.post(format!("{base}/api/queue/pause")).send().await?,
        Commands::Resume => client.post(format!("{base}/api/queue/resume")).send().await?,
        Commands::Clear => client.post(format!("{base}/api/queue/clear")).send().await?,
        Commands::Remove { id } => {
            client
                .post(format!("{base}/api/queue/remove"))
                .json(&json!({ "id": id }))
                .send()
                .await?
        }
    };

    print_response(res).await
}

fn present(fields: &[(&str, Option<Value>)]) -> Map<String, Value> {
    fields
        .iter()
        .filter_map(|(name, value)| value.clone().map(|v| (name.to_string(), v)))
        .collect()
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: relay API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
