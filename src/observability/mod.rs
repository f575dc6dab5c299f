//! # Observability
//!
//! Structured logging init, Prometheus metrics, and the `/metrics`
//! `/healthz` `/readyz` HTTP surface, grounded in the teacher's
//! `observability`/`server.rs` modules.

pub mod metrics;
pub mod server;

/// Install the global `tracing` subscriber. Level is controlled by
/// `RUST_LOG`, defaulting to `secret_sync_daemon=info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "secret_sync_daemon=info".into()),
        )
        .init();
}
