mod assistant;
mod bootstrap;
mod health;
mod stream;
#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use proactor_core::config::{AppConfig, LoadOptions};
use tokio_util::sync::CancellationToken;

fn init_logging(config: &AppConfig) {
    use proactor_core::config::LogFormat::*;
    use tracing_subscriber::EnvFilter;

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

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let routes = Router::new()
        .merge(health::router(app.orchestrator_mode))
        .merge(stream::router(app.runner.clone(), app.config.stream.chunk_size))
        .merge(assistant::router(app.runner.clone(), Arc::clone(&app.transcript)));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        address = %address,
        orchestrator_mode = app.orchestrator_mode.as_str(),
        "proactor-server listening"
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    let runner = app.runner.clone();
    tokio::spawn(async move {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(
                event_name = "system.server.signal_error",
                correlation_id = "shutdown",
                error = %error,
                "failed to listen for shutdown signal"
            );
        }
        runner.reset();
        signal.cancel();
    });

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let drained = shutdown.clone();
    let server = async move {
        axum::serve(listener, routes)
            .with_graceful_shutdown(async move { drained.cancelled().await })
            .await
    };
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => result.context("server terminated unexpectedly")?,
        _ = async {
            shutdown.cancelled().await;
            tokio::time::sleep(grace).await;
        } => {
            tracing::warn!(
                event_name = "system.server.shutdown_timeout",
                correlation_id = "shutdown",
                grace_secs = grace.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
        }
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "proactor-server stopping"
    );

    Ok(())
}
