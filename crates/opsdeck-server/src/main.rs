//! Opsdeck HTTP/JSON API binary.

use std::sync::Arc;

use clap::Parser;
use opsdeck_core::{ControlPlane, PostgresGateway};
use opsdeck_server::{create_router, AppState, Args, ServerConfig};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("opsdeck=info,tower_http=info")),
        )
        .init();

    // Parse command line args
    let args = Args::parse();
    let config = ServerConfig::from(&args);

    info!(
        listen = %config.listen_addr,
        persistent = config.ops.is_persistent(),
        "Starting Opsdeck server"
    );

    if config.pool_max_connections == 0 {
        anyhow::bail!("pool_max_connections must be at least 1");
    }

    let gateway = PostgresGateway::connect(
        &config.database_url,
        config.pool_max_connections,
        config.pool_acquire_timeout,
    )
    .await?;
    info!(
        max_connections = config.pool_max_connections,
        "Connected to backing store"
    );

    let plane = ControlPlane::open(config.ops.clone(), Arc::new(gateway))?;
    let state = AppState::new(plane);

    if config.monitor_on_start {
        state.plane.start_monitoring(None)?;
    }

    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("Server listening on {}", config.listen_addr);

    let shutdown = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
            shutdown.cancel();
        })
        .await?;

    state.plane.shutdown().await?;
    info!("Server stopped");

    Ok(())
}
