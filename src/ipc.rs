//! # Inbound Request Channel (C9)
//!
//! A minimal stand-in for the host's plugin wire protocol (spec §6
//! "Inbound"): a length-prefixed JSON request/response loop over a Unix
//! domain socket. This framing is *not* a specified contract — C1-C7 never
//! depend on it — it exists only to drive the fetch driver end-to-end the
//! way a real plugin host would.

use crate::driver::FetchDriver;
use crate::types::FetchRequest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

#[derive(Debug, Deserialize)]
struct WireRequest {
    secret_name: String,
    #[serde(default)]
    service_name: Option<String>,
    #[serde(default)]
    secret_labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct WireResponse {
    value: Option<String>,
    do_not_reuse: bool,
    err: Option<String>,
}

/// Accept connections on `socket_path` until `shutdown` fires, serving one
/// request/response exchange per connection.
pub async fn serve(
    socket_path: &str,
    driver: Arc<FetchDriver>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let _ = std::fs::remove_file(socket_path);
    if let Some(parent) = std::path::Path::new(socket_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(socket_path)?;
    info!("ipc: listening on {socket_path}");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                let driver = driver.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(stream, driver).await {
                        warn!("ipc: connection error: {err}");
                    }
                });
            }
            _ = shutdown.changed() => {
                info!("ipc: shutdown signal received, closing listener");
                let _ = std::fs::remove_file(socket_path);
                return Ok(());
            }
        }
    }
}

async fn handle_connection(mut stream: UnixStream, driver: Arc<FetchDriver>) -> anyhow::Result<()> {
    loop {
        let mut len_buf = [0u8; 4];
        if stream.read_exact(&mut len_buf).await.is_err() {
            return Ok(());
        }
        let len = u32::from_be_bytes(len_buf) as usize;

        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await?;

        let response = match serde_json::from_slice::<WireRequest>(&payload) {
            Ok(wire) => handle_request(&driver, wire).await,
            Err(e) => WireResponse {
                value: None,
                do_not_reuse: false,
                err: Some(format!("malformed request: {e}")),
            },
        };

        let body = serde_json::to_vec(&response)?;
        stream.write_all(&(body.len() as u32).to_be_bytes()).await?;
        stream.write_all(&body).await?;
    }
}

async fn handle_request(driver: &FetchDriver, wire: WireRequest) -> WireResponse {
    let mut request = FetchRequest::new(wire.secret_name);
    if let Some(service_name) = wire.service_name {
        request = request.with_service_name(service_name);
    }
    for (k, v) in wire.secret_labels {
        request = request.with_label(k, v);
    }

    match driver.fetch(&request).await {
        Ok(response) => {
            debug!(secret = %request.secret_name, "ipc: fetch succeeded");
            WireResponse {
                value: String::from_utf8(response.value).ok(),
                do_not_reuse: response.do_not_reuse,
                err: None,
            }
        }
        Err(err) => {
            error!(secret = %request.secret_name, error = %err, "ipc: fetch failed");
            WireResponse {
                value: None,
                do_not_reuse: false,
                err: Some(err.message()),
            }
        }
    }
}
