//! `serve` mode: periodic runner + REST API in one process.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use powerwatch_core::PowerwatchConfig;

use crate::setup;

pub async fn run_serve(
    config: PowerwatchConfig,
    config_path: PathBuf,
    port_override: Option<u16>,
) -> anyhow::Result<()> {
    info!(config = %config_path.display(), "powerwatch daemon starting");

    let poll_interval = config.engine.poll_interval()?;
    let engine = Arc::new(setup::build_engine(&config, &config_path)?);
    info!(
        threshold_secs = engine.policy().threshold.as_secs(),
        call_timeout_ms = engine.policy().call_timeout.as_millis() as u64,
        schema = engine.policy().features.schema.name(),
        "shutoff engine initialized"
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Periodic runner ────────────────────────────────────────

    let runner_handle = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine.run(poll_interval, shutdown_rx).await;
        })
    };

    // ── API server ─────────────────────────────────────────────

    let router = powerwatch_api::build_router(engine);
    let port = port_override.unwrap_or(config.api.port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;
    let _ = runner_handle.await;

    info!("powerwatch daemon stopped");
    Ok(())
}
