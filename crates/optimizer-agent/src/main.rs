//! Optimizer Agent - adaptive request optimizer host
//!
//! Serves the application routes through the optimizer middleware and
//! exposes health, metrics and introspection endpoints.

use anyhow::{Context, Result};
use optimizer_agent::{api, config::AgentConfig};
use optimizer_lib::OptimizerService;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting optimizer-agent");

    // Load configuration
    let config = AgentConfig::load()?;
    info!(
        node_name = %config.node_name,
        api_port = config.api_port,
        enabled = config.optimizer.enabled,
        "Agent configured"
    );

    let service = Arc::new(
        OptimizerService::builder(config.optimizer.clone())
            .instance(config.node_name.clone())
            .build()
            .context("failed to build optimizer service")?,
    );
    service.start().await?;

    let state = Arc::new(api::AppState::new(service.clone()));
    let router = api::create_router(state, api::default_app());

    if let Err(e) = api::serve(config.api_port, router, shutdown_signal()).await {
        error!(error = %e, "API server failed");
    }

    info!("Shutting down");
    service.stop().await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("SIGINT received");
}
