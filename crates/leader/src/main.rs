//! Ceph leader - storage cluster reconciliation daemon
//!
//! Publishes the desired state of a Ceph cluster (identity, monitor quorum,
//! OSD placement) to the distributed store and keeps it in step with the
//! node inventory.

use anyhow::Result;
use leader_lib::{
    health::{components, HealthRegistry},
    Context, MemoryStore, ProcessExecutor, RefreshLoopBuilder, Service, StaticInventory,
    StructuredLogger,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const LEADER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting ceph-leader");

    let config = config::LeaderConfig::load()?;
    info!(
        node_id = %config.node_id,
        nodes = config.nodes.len(),
        "Leader configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::LEADER).await;
    health_registry.register(components::STORE).await;
    health_registry.register(components::DISPATCHER).await;

    let logger = StructuredLogger::new(&config.node_id);

    let service = Service::new(config.service_options());
    logger.log_startup(LEADER_VERSION, &service.agent_names());

    let context = Context::new(
        Arc::new(MemoryStore::new()),
        Arc::new(ProcessExecutor::new()),
    );
    let inventory = Arc::new(StaticInventory::new(config.topology()));

    let (shutdown_tx, _) = broadcast::channel(1);

    let refresh_loop = RefreshLoopBuilder::new()
        .leader(service.leader)
        .context(context)
        .inventory(inventory)
        .health(health_registry.clone())
        .logger(logger.clone())
        .interval(config.refresh_interval())
        .build()?;
    let loop_handle = tokio::spawn(refresh_loop.run(shutdown_tx.subscribe()));

    let app_state = Arc::new(api::AppState::new(health_registry));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    if shutdown_tx.send(()).is_err() {
        warn!("Refresh loop already stopped");
    }
    if let Err(e) = loop_handle.await {
        warn!(error = %e, "Refresh loop terminated abnormally");
    }
    api_handle.abort();

    info!("Shutdown complete");
    Ok(())
}
