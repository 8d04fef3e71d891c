mod api;
mod bootstrap;
mod health;

use std::future::IntoFuture;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use vitalis_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use tracing::Level;
    use vitalis_core::config::LogFormat::*;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
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

    let app = bootstrap::bootstrap_with_config(config)?;

    let requests = CancellationToken::new();
    let stop_accepting = CancellationToken::new();
    let routes = api::router(api::ApiState {
        runtime: app.runtime.clone(),
        requests: requests.clone(),
    })
    .merge(health::router(app.datasets.clone()));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("could not bind {address}"))?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "vitalis-server listening"
    );

    let mut server = tokio::spawn(
        axum::serve(listener, routes)
            .with_graceful_shutdown(stop_accepting.clone().cancelled_owned())
            .into_future(),
    );

    tokio::select! {
        result = &mut server => {
            result.context("server task failed")??;
            return Ok(());
        }
        signal = wait_for_shutdown() => signal?,
    }

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = grace.as_secs(),
        "vitalis-server draining in-flight requests"
    );
    stop_accepting.cancel();

    match tokio::time::timeout(grace, &mut server).await {
        Ok(result) => result.context("server task failed")??,
        Err(_) => {
            tracing::warn!(
                event_name = "system.server.grace_elapsed",
                correlation_id = "shutdown",
                "cancelling in-flight requests"
            );
            requests.cancel();
            server.await.context("server task failed")??;
        }
    }

    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "vitalis-server stopped"
    );
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
