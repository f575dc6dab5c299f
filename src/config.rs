//! # Configuration (C7 input)
//!
//! Flat environment-variable surface, per spec §6 "Configuration surface".
//! Grounded in the teacher's config-from-env style (`main.rs` reading
//! `SECRET_MANAGER_*` variables with typed defaults) generalized to this
//! daemon's smaller, rotation-centric surface.

use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:9090";
const DEFAULT_IPC_SOCKET: &str = "/run/secret-sync-daemon/ipc.sock";
const DEFAULT_PRUNE_AFTER_TICKS: u32 = 6;

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Selects the single adapter instantiated by C7 (spec §6 `SECRETS_PROVIDER`).
    pub provider_id: String,
    pub rotation_enabled: bool,
    pub rotation_interval: Duration,
    pub fetch_timeout: Duration,
    pub http_addr: String,
    pub ipc_socket_path: String,
    /// Opt-in registry pruning (spec §9 open question (a)); off by default so
    /// it can never change the documented default lifecycle on its own.
    pub prune_stale_records: bool,
    /// Consecutive ticks with zero orchestrator-reported consumers before a
    /// record is pruned, once `prune_stale_records` is enabled.
    pub prune_after_ticks: u32,
    /// The full process environment, handed to the provider's `init` so it
    /// can select the keys it needs (spec §4.7).
    pub provider_config: HashMap<String, String>,
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();

        let provider_id = env
            .get("SECRETS_PROVIDER")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("SECRETS_PROVIDER is required (vault, openbao, aws, gcp, azure)"))?;

        let rotation_enabled = env
            .get("ENABLE_ROTATION")
            .map(|v| !v.eq_ignore_ascii_case("false") && v != "0")
            .unwrap_or(true);

        let rotation_interval = env
            .get("ROTATION_INTERVAL")
            .map(|v| parse_duration(v))
            .transpose()?
            .unwrap_or(DEFAULT_ROTATION_INTERVAL);

        let fetch_timeout = env
            .get("FETCH_TIMEOUT")
            .map(|v| parse_duration(v))
            .transpose()?
            .unwrap_or(DEFAULT_FETCH_TIMEOUT);

        let http_addr = env.get("HTTP_ADDR").cloned().unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string());
        let ipc_socket_path = env
            .get("IPC_SOCKET_PATH")
            .cloned()
            .unwrap_or_else(|| DEFAULT_IPC_SOCKET.to_string());

        let prune_stale_records = env
            .get("PRUNE_STALE_RECORDS")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);
        let prune_after_ticks = env
            .get("PRUNE_STALE_AFTER_TICKS")
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|_| anyhow::anyhow!("PRUNE_STALE_AFTER_TICKS must be a positive integer"))?
            .unwrap_or(DEFAULT_PRUNE_AFTER_TICKS);

        Ok(Self {
            provider_id,
            rotation_enabled,
            rotation_interval,
            fetch_timeout,
            http_addr,
            ipc_socket_path,
            prune_stale_records,
            prune_after_ticks,
            provider_config: env,
        })
    }
}

/// Parse a Kubernetes-style duration string (`"10s"`, `"5m"`, `"1h"`); a bare
/// integer is interpreted as seconds.
fn parse_duration(raw: &str) -> anyhow::Result<Duration> {
    let raw = raw.trim();
    if let Ok(seconds) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    let (number, unit) = raw.split_at(raw.len().saturating_sub(1));
    let value: u64 = number
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid duration {raw:?}"))?;

    match unit {
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        _ => Err(anyhow::anyhow!("invalid duration unit in {raw:?}, expected s/m/h")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_seconds_minutes_hours() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn bare_integer_is_seconds() {
        assert_eq!(parse_duration("42").unwrap(), Duration::from_secs(42));
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!(parse_duration("10x").is_err());
    }
}
