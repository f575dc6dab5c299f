//! # Rotation Engine (C6)
//!
//! Periodic scan of the tracking registry (C4); on detected change, drives
//! the MUTATE_ORCHESTRATOR procedure (spec §4.6). Runs as a single background
//! task per [`crate::assembly::DriverAssembly`].

use crate::error::{OrchestratorError, ProviderError, RotationError};
use crate::observability::metrics;
use crate::orchestrator::{OrchestratorClient, OrchestratorSecret, SecretData};
use crate::provider::SecretProvider;
use crate::registry::Registry;
use crate::types::{sha256_hex, FetchRequest, TrackingRecord};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

const ORCHESTRATOR_NAMESPACE: &str = "default";
const LIST_TIMEOUT: Duration = Duration::from_secs(60);
const MUTATE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RotationEngine {
    provider: Arc<dyn SecretProvider>,
    orchestrator: Arc<dyn OrchestratorClient>,
    registry: Arc<Registry>,
    interval: Duration,
    namespace: String,
    prune_stale_records: bool,
    prune_after_ticks: u32,
    /// Consecutive ticks each record has shown zero orchestrator-reported
    /// consumers, used only when `prune_stale_records` is enabled (spec §9
    /// open question (a)).
    stale_ticks: Mutex<HashMap<String, u32>>,
}

impl RotationEngine {
    pub fn new(
        provider: Arc<dyn SecretProvider>,
        orchestrator: Arc<dyn OrchestratorClient>,
        registry: Arc<Registry>,
        interval: Duration,
    ) -> Self {
        Self {
            provider,
            orchestrator,
            registry,
            interval,
            namespace: ORCHESTRATOR_NAMESPACE.to_string(),
            prune_stale_records: false,
            prune_after_ticks: 0,
            stale_ticks: Mutex::new(HashMap::new()),
        }
    }

    /// Enable the opt-in stale-record pruning described in spec §9 open
    /// question (a). Disabled by default (see [`RotationEngine::new`]).
    pub fn with_pruning(mut self, enabled: bool, after_ticks: u32) -> Self {
        self.prune_stale_records = enabled;
        self.prune_after_ticks = after_ticks;
        self
    }

    /// Run ticks until `shutdown` fires, per spec §4.7 "spawn the rotation
    /// loop" / §5 "honors a cancellation signal from the supervisor".
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    info!("rotation engine: shutdown signal received, exiting");
                    return;
                }
            }
        }
    }

    /// One SCAN → CHECK → FETCH_NEW → MUTATE_ORCHESTRATOR pass over every
    /// tracked record (spec §4.6 state machine). Records are processed
    /// serially within a tick (spec §4.6 "Orderings & tie-breaks").
    pub async fn tick(&self) {
        let snapshot = self.registry.snapshot().await;
        metrics::set_tracked_secrets(snapshot.len() as i64);
        if snapshot.is_empty() {
            return;
        }

        let started = Instant::now();
        for record in &snapshot {
            match self.process_record(record).await {
                Ok(()) => {}
                Err(err) => {
                    if matches!(err, RotationError::CheckFailed(_)) {
                        // Not counted as a rotation failure (spec §4.6
                        // "Failure semantics": check errors are routine).
                    } else {
                        metrics::increment_rotation_failures();
                    }
                    warn!(secret = %record.orch_secret_name, error = %err, "rotation pass failed for record");
                }
            }

            if self.prune_stale_records {
                self.maybe_prune(record).await;
            }
        }
        metrics::observe_rotation_tick_duration(started.elapsed().as_secs_f64());
    }

    async fn process_record(&self, record: &TrackingRecord) -> Result<(), RotationError> {
        let changed = match self.provider.check_changed(record).await {
            Ok(changed) => changed,
            Err(err) => {
                // Provider check_changed error: log, continue; not counted
                // as a rotation failure (spec §4.6 "Failure semantics").
                return Err(RotationError::CheckFailed(err));
            }
        };

        if !changed {
            return Ok(());
        }

        info!(secret = %record.orch_secret_name, provider = record.provider_id, "change detected, rotating");

        let new_bytes = self
            .fetch_new_value(record)
            .await
            .map_err(RotationError::FetchFailed)?;

        self.mutate_orchestrator(record, &new_bytes)
            .await
            .map_err(RotationError::MutationFailed)?;

        self.registry
            .record_rotation(&record.orch_secret_name, &new_bytes, SystemTime::now())
            .await;
        metrics::increment_rotations();

        Ok(())
    }

    /// Delete a tracking record once the orchestrator has reported zero
    /// consumers for `prune_after_ticks` consecutive ticks. Gated behind
    /// `prune_stale_records`; never runs otherwise (spec §9 open question (a)).
    async fn maybe_prune(&self, record: &TrackingRecord) {
        let consumers = match self
            .orchestrator
            .list_consumers(&self.namespace, &record.orch_secret_name)
            .await
        {
            Ok(consumers) => consumers,
            Err(err) => {
                warn!(secret = %record.orch_secret_name, error = %err, "stale-record check failed, skipping");
                return;
            }
        };

        let mut counts = self.stale_ticks.lock().await;
        if consumers.is_empty() {
            let count = counts.entry(record.orch_secret_name.clone()).or_insert(0);
            *count += 1;
            if *count >= self.prune_after_ticks {
                counts.remove(&record.orch_secret_name);
                drop(counts);
                if self.registry.remove(&record.orch_secret_name).await {
                    info!(secret = %record.orch_secret_name, "pruned stale tracking record with no remaining consumers");
                }
            }
        } else {
            counts.remove(&record.orch_secret_name);
        }
    }

    async fn fetch_new_value(&self, record: &TrackingRecord) -> Result<Vec<u8>, ProviderError> {
        let synthetic = FetchRequest::new(&record.orch_secret_name)
            .with_label(format!("{}_field", record.provider_id), &record.field)
            .with_label(format!("{}_path", record.provider_id), &record.locator)
            .with_label(format!("{}_secret_name", record.provider_id), &record.locator);
        self.provider.fetch(&synthetic).await
    }

    /// MUTATE_ORCHESTRATOR, spec §4.6 steps 1-6.
    async fn mutate_orchestrator(
        &self,
        record: &TrackingRecord,
        new_bytes: &[u8],
    ) -> Result<(), OrchestratorError> {
        // Step 1: locate the existing orchestrator-secret.
        let existing = tokio::time::timeout(
            LIST_TIMEOUT,
            self.orchestrator.get_secret(&self.namespace, &record.orch_secret_name),
        )
        .await
        .map_err(|_| OrchestratorError::Operation("list timed out".to_string()))??;

        let Some(existing) = existing else {
            return Err(OrchestratorError::SecretNotFound(record.orch_secret_name.clone()));
        };

        // Step 2: create the new orchestrator-secret object, copying the
        // existing object's labels verbatim (spec §4.6 step 2).
        let new_name = format!("{}-{}", record.orch_secret_name, nanosecond_timestamp());
        let mut new_data = SecretData::new();
        new_data.insert(record.field.clone(), new_bytes.to_vec());

        tokio::time::timeout(
            MUTATE_TIMEOUT,
            self.orchestrator.put_secret(&self.namespace, &new_name, new_data, existing.labels),
        )
        .await
        .map_err(|_| OrchestratorError::Operation("create timed out".to_string()))??;

        // Step 3 + 4: rewire every consumer workload's secret reference from
        // the old name to the new name, best-effort delete the new object on
        // any failure.
        for consumer in &record.consumers {
            let result = tokio::time::timeout(
                MUTATE_TIMEOUT,
                self.orchestrator.rewire_workload(
                    &self.namespace,
                    consumer,
                    &record.orch_secret_name,
                    &new_name,
                    &record.provider_id,
                ),
            )
            .await;

            let failed = !matches!(result, Ok(Ok(())));
            if failed {
                warn!(
                    workload = %consumer,
                    new_secret = %new_name,
                    "workload update failed during rotation, rolling back new secret"
                );
                if let Err(cleanup_err) = self.orchestrator.delete_secret(&self.namespace, &new_name).await {
                    error!(new_secret = %new_name, error = %cleanup_err, "failed to roll back orphaned secret");
                }
                return Err(OrchestratorError::Operation(format!(
                    "workload {consumer} update failed during rotation"
                )));
            }
        }

        // Step 5: best-effort delete of the old object; never fatal.
        if let Err(err) = self
            .orchestrator
            .delete_secret(&self.namespace, &record.orch_secret_name)
            .await
        {
            warn!(
                old_secret = %record.orch_secret_name,
                error = %err,
                "failed to delete superseded secret, new version is already live"
            );
        }

        Ok(())
    }
}

fn nanosecond_timestamp() -> u128 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_nanos()
}
