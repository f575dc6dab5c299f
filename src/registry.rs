//! # Tracking Registry (C4)
//!
//! A concurrent mapping from orchestrator-secret name to [`TrackingRecord`],
//! shared between the synchronous fetch path (C5, writer on every tracked
//! fetch) and the rotation engine (C6, snapshot reader + occasional writer),
//! per spec §4.4 and §5.
//!
//! The lock is a `tokio::sync::RwLock` rather than a plain `std::sync::Mutex`:
//! callers never hold it across I/O (fetches/orchestrator calls happen
//! outside the lock, per spec §5), so contention is limited to cheap
//! map mutation and a reader-preferring lock is a reasonable default.

use crate::types::{sha256_hex, TrackingRecord};
use std::collections::HashMap;
use std::time::SystemTime;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct Registry {
    records: RwLock<HashMap<String, TrackingRecord>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Upsert a record for `orch_secret_name` (spec §4.4 "Upsert", I2).
    ///
    /// If absent, inserts a new record. If present, unions `consumer` into
    /// `consumers` and refreshes `fingerprint`/`last_updated` to the delivered
    /// bytes (I1: the fingerprint always reflects delivered bytes).
    pub async fn upsert(
        &self,
        orch_secret_name: &str,
        provider_id: &str,
        locator: &str,
        field: &str,
        consumer: Option<&str>,
        delivered_bytes: &[u8],
        now: SystemTime,
    ) {
        let fingerprint = sha256_hex(delivered_bytes);
        let mut guard = self.records.write().await;

        match guard.get_mut(orch_secret_name) {
            Some(existing) => {
                existing.add_consumer(consumer);
                existing.fingerprint = fingerprint;
                existing.last_updated = now;
            }
            None => {
                guard.insert(
                    orch_secret_name.to_string(),
                    TrackingRecord::new(
                        orch_secret_name,
                        provider_id,
                        locator,
                        field,
                        consumer.map(str::to_string),
                        fingerprint,
                        now,
                    ),
                );
            }
        }
    }

    /// Write back a post-rotation fingerprint for `orch_secret_name` (called
    /// by C6 after a successful MUTATE_ORCHESTRATOR, spec §4.6 step 6).
    pub async fn record_rotation(&self, orch_secret_name: &str, new_bytes: &[u8], now: SystemTime) {
        let mut guard = self.records.write().await;
        if let Some(record) = guard.get_mut(orch_secret_name) {
            record.fingerprint = sha256_hex(new_bytes);
            record.last_updated = now;
        }
    }

    /// Shallow copy of all records for iteration outside the lock (spec
    /// §4.4 "Snapshot", used by C6 each tick).
    pub async fn snapshot(&self) -> Vec<TrackingRecord> {
        self.records.read().await.values().cloned().collect()
    }

    pub async fn get(&self, orch_secret_name: &str) -> Option<TrackingRecord> {
        self.records.read().await.get(orch_secret_name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Explicit deletion, gated behind the `PRUNE_STALE_RECORDS` flag (spec
    /// §9 open question (a)). Not part of the default lifecycle: records are
    /// otherwise destroyed only at daemon shutdown. Returns whether a record
    /// was actually removed.
    pub async fn remove(&self, orch_secret_name: &str) -> bool {
        self.records.write().await.remove(orch_secret_name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_creates_a_new_record() {
        let registry = Registry::new();
        registry
            .upsert("db", "vault", "secret/data/app/db", "password", Some("app"), b"p1", SystemTime::now())
            .await;

        let record = registry.get("db").await.unwrap();
        assert_eq!(record.consumers, vec!["app".to_string()]);
        assert_eq!(record.fingerprint, sha256_hex(b"p1"));
    }

    #[tokio::test]
    async fn consumer_union_has_no_duplicates() {
        let registry = Registry::new();
        registry
            .upsert("db", "vault", "secret/data/app/db", "password", Some("app"), b"p1", SystemTime::now())
            .await;
        registry
            .upsert("db", "vault", "secret/data/app/db", "password", Some("worker"), b"p1", SystemTime::now())
            .await;
        registry
            .upsert("db", "vault", "secret/data/app/db", "password", Some("app"), b"p1", SystemTime::now())
            .await;

        let record = registry.get("db").await.unwrap();
        assert_eq!(record.consumers, vec!["app".to_string(), "worker".to_string()]);
    }

    #[tokio::test]
    async fn upsert_without_consumer_leaves_consumers_empty() {
        let registry = Registry::new();
        registry
            .upsert("db", "vault", "secret/data/db", "password", None, b"p1", SystemTime::now())
            .await;
        let record = registry.get("db").await.unwrap();
        assert!(record.consumers.is_empty());
    }

    #[tokio::test]
    async fn snapshot_reflects_current_state() {
        let registry = Registry::new();
        registry
            .upsert("a", "vault", "l", "value", None, b"1", SystemTime::now())
            .await;
        registry
            .upsert("b", "vault", "l", "value", None, b"2", SystemTime::now())
            .await;
        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 2);
    }

    #[tokio::test]
    async fn record_rotation_updates_fingerprint_and_timestamp() {
        let registry = Registry::new();
        registry
            .upsert("db", "vault", "l", "password", Some("app"), b"p1", SystemTime::now())
            .await;
        let before = registry.get("db").await.unwrap().last_updated;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let now = SystemTime::now();
        registry.record_rotation("db", b"p2", now).await;

        let record = registry.get("db").await.unwrap();
        assert_eq!(record.fingerprint, sha256_hex(b"p2"));
        assert!(record.last_updated >= before);
    }

    #[tokio::test]
    async fn record_rotation_on_absent_record_is_a_no_op() {
        let registry = Registry::new();
        registry.record_rotation("missing", b"x", SystemTime::now()).await;
        assert!(registry.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn remove_deletes_an_existing_record_and_reports_it() {
        let registry = Registry::new();
        registry.upsert("db", "vault", "l", "value", None, b"p1", SystemTime::now()).await;
        assert!(registry.remove("db").await);
        assert!(registry.get("db").await.is_none());
        assert!(!registry.remove("db").await, "second removal finds nothing");
    }
}
