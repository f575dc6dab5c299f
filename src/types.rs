//! # Data Model
//!
//! `FetchRequest`, `FetchResponse`, and `TrackingRecord`, matching spec §3.

use std::collections::BTreeMap;
use std::time::SystemTime;

/// Inbound request from the orchestrator plugin host (spec §3, §6).
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub secret_name: String,
    pub service_name: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl FetchRequest {
    pub fn new(secret_name: impl Into<String>) -> Self {
        Self {
            secret_name: secret_name.into(),
            service_name: None,
            labels: BTreeMap::new(),
        }
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Response delivered back to the orchestrator plugin host.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub value: Vec<u8>,
    pub do_not_reuse: bool,
}

/// Bookkeeping for one rotatable secret, shared between C5 and C6 (spec §3).
#[derive(Debug, Clone)]
pub struct TrackingRecord {
    pub orch_secret_name: String,
    pub provider_id: String,
    pub locator: String,
    /// Selected JSON field, or the sentinel `"value"` meaning "whole payload".
    pub field: String,
    /// Deduped, insertion order not semantically significant (spec I3).
    pub consumers: Vec<String>,
    /// Hex-encoded SHA-256 of the last-*delivered* bytes (spec I1).
    pub fingerprint: String,
    pub last_updated: SystemTime,
}

impl TrackingRecord {
    pub fn new(
        orch_secret_name: impl Into<String>,
        provider_id: impl Into<String>,
        locator: impl Into<String>,
        field: impl Into<String>,
        consumer: Option<String>,
        fingerprint: impl Into<String>,
        now: SystemTime,
    ) -> Self {
        let consumers = match consumer {
            Some(c) if !c.is_empty() => vec![c],
            _ => Vec::new(),
        };
        Self {
            orch_secret_name: orch_secret_name.into(),
            provider_id: provider_id.into(),
            locator: locator.into(),
            field: field.into(),
            consumers,
            fingerprint: fingerprint.into(),
            last_updated: now,
        }
    }

    /// Union a consumer into the record, respecting invariant I3 (never the
    /// empty string) and keeping the set deduped.
    pub fn add_consumer(&mut self, consumer: Option<&str>) {
        if let Some(c) = consumer {
            if !c.is_empty() && !self.consumers.iter().any(|existing| existing == c) {
                self.consumers.push(c.to_string());
            }
        }
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
