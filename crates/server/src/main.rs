use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use workshop_core::config::{AppConfig, LoadOptions};
use workshop_server::bootstrap;

fn init_logging(config: &AppConfig) {
    use workshop_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

async fn run() -> Result<()> {
    // Logging comes up before anything that might want to log.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("could not bind {address}"))?;

    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        "workshop-server listening"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    axum::serve(listener, workshop_server::app(app.state))
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    tracing::info!(event_name = "system.server.stopping", "workshop-server stopping");
    if tokio::time::timeout(grace, app.db_pool.close()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            grace_secs = grace.as_secs(),
            "database pool did not close in time"
        );
    }

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(event_name = "system.server.signal_error", error = %error, "ctrl-c handler failed");
    }
}
