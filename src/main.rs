use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use telemetry_receivers::cli::Args;
use telemetry_receivers::config::Config;
use telemetry_receivers::logging::init_tracing;
use telemetry_receivers::ratelimit::RateLimitPoller;
use telemetry_receivers::sink::JsonLinesSink;
use telemetry_receivers::webhook::WebhookServer;
use telemetry_receivers::TaskHandle;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)?;
    config.validate()?;

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.effective_log_level().to_string());
    init_tracing(&level).map_err(|e| format!("failed to install tracing subscriber: {e}"))?;

    if args.check {
        eprintln!("  {} is valid", args.config.display());
        return Ok(());
    }

    // Both receivers write to the same stdout stream, one JSON batch per line.
    let sink = Arc::new(JsonLinesSink::stdout());
    let mut handles: Vec<TaskHandle> = Vec::new();

    if let Some(raw) = &config.github_rate_limit {
        let handle = RateLimitPoller::builder(raw.validate()?)
            .sink(sink.clone())
            .start()?;
        handles.push(handle);
    }

    if let Some(raw) = &config.webhook {
        let server = WebhookServer::bind(raw.validate()?, sink.clone()).await?;
        info!(addr = %server.local_addr()?, "webhook listener bound");
        handles.push(server.start());
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl-C, shutting down");
    }
    info!("shutdown requested");

    for handle in handles {
        handle.shutdown().await;
    }

    Ok(())
}
