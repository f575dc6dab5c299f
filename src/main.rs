//! # Secret Synchronization Daemon
//!
//! Bridges an external secret backend (Vault, OpenBao, AWS Secrets Manager,
//! GCP Secret Manager, Azure Key Vault) with an orchestrator's native secret
//! primitive.
//!
//! ## Overview
//!
//! 1. **Fetch driver** - serves synchronous "give me the bytes for secret X"
//!    requests over a Unix domain socket, tagging rotatable secrets as it goes.
//! 2. **Rotation engine** - ticks in the background, detects upstream changes,
//!    and atomically swaps the orchestrator's native secret object.
//! 3. **Observability** - Prometheus metrics and health/readiness probes over HTTP.

use anyhow::{Context, Result};
use secret_sync_daemon::assembly::DriverAssembly;
use secret_sync_daemon::config::DaemonConfig;
use secret_sync_daemon::observability::{self, metrics, server::{start_server, ServerState}};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();
    info!("starting secret synchronization daemon");

    let config = DaemonConfig::from_env().context("failed to load configuration")?;

    metrics::register_metrics().context("failed to register metrics")?;

    let server_state = Arc::new(ServerState {
        is_ready: Arc::new(AtomicBool::new(false)),
    });
    let server_state_clone = server_state.clone();
    let http_addr = config.http_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = start_server(&http_addr, server_state_clone).await {
            error!("HTTP server error: {e}");
        }
    });

    let assembly = DriverAssembly::build(&config)
        .await
        .context("failed to assemble driver")?;

    server_state.is_ready.store(true, std::sync::atomic::Ordering::Relaxed);
    info!(provider = %config.provider_id, rotation_enabled = config.rotation_enabled, "daemon ready");

    let (ipc_shutdown_tx, ipc_shutdown_rx) = tokio::sync::watch::channel(false);
    let ipc_driver = assembly.driver.clone();
    let ipc_socket_path = config.ipc_socket_path.clone();
    let ipc_handle = tokio::spawn(async move {
        if let Err(e) = secret_sync_daemon::ipc::serve(&ipc_socket_path, ipc_driver, ipc_shutdown_rx).await {
            error!("IPC server error: {e}");
        }
    });

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    let _ = ipc_shutdown_tx.send(true);
    let _ = ipc_handle.await;
    assembly.shutdown().await;

    info!("daemon stopped");
    Ok(())
}
