mod bootstrap;
mod health;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use flowerbot_core::config::{AppConfig, LoadOptions};
use tokio_util::sync::CancellationToken;

const SESSION_SWEEP_PERIOD: Duration = Duration::from_secs(60);

fn init_logging(config: &AppConfig) {
    use flowerbot_core::config::LogFormat::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

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

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let http_shutdown = CancellationToken::new();

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
        &app.config.storage.media_dir,
        http_shutdown.clone(),
    )
    .await?;

    tracing::info!(
        event_name = "system.server.gateway_transport_mode",
        transport_mode = if app.gateway.is_noop_transport() { "noop" } else { "live" },
        correlation_id = "bootstrap",
        "gateway transport mode initialized"
    );

    let gateway = Arc::new(app.gateway);
    let gateway_shutdown = gateway.shutdown_token();
    let runner = gateway.clone();
    let mut gateway_task = tokio::spawn(async move { runner.start().await });

    let sweeper = app.services.wizard.clone();
    let sweep_shutdown = http_shutdown.clone();
    tokio::spawn(async move {
        sweeper.sweep_idle_sessions(SESSION_SWEEP_PERIOD, sweep_shutdown).await;
    });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "flowerbot-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        pending_drafts = app.services.wizard.sessions().len(),
        pending_captures = app.services.wizard.collectors().active_count(),
        "flowerbot-server stopping"
    );

    gateway_shutdown.cancel();
    http_shutdown.cancel();
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, &mut gateway_task).await {
        Ok(Ok(result)) => result?,
        Ok(Err(join_error)) => {
            tracing::error!(
                event_name = "system.server.gateway_panicked",
                correlation_id = "shutdown",
                error = %join_error,
                "gateway task ended abnormally"
            );
        }
        Err(_) => {
            tracing::warn!(
                event_name = "system.server.shutdown_timeout",
                correlation_id = "shutdown",
                grace_secs = grace.as_secs(),
                "in-flight interactions did not finish before the grace period"
            );
            gateway_task.abort();
        }
    }

    app.db_pool.close().await;
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
