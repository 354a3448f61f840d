mod config;
mod error;
mod gateway;
mod models;
mod pipeline;
mod prompts;
mod retry;
mod routes;
#[cfg(test)]
mod test_support;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{config::AppConfig, gateway::GatewayClient, pipeline::Orchestrator, routes::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env()?;
    tracing::info!(
        key = %config.masked_key(),
        gateway = %config.gateway_url,
        timeout_secs = config.timeout.as_secs(),
        max_attempts = config.retry.max_attempts,
        "Using AI gateway"
    );

    let client = GatewayClient::new(config.gateway_url.clone(), config.api_key.clone(), config.timeout)
        .context("building HTTP client")?;
    let orchestrator = Orchestrator::new(Arc::new(client), config.models.clone(), config.retry.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = AppState { orchestrator: Arc::new(orchestrator), shutdown: shutdown_rx };
    let app = routes::router(state, config.max_body_bytes);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "Starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down, cancelling in-flight runs");
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("server error")?;
    Ok(())
}
