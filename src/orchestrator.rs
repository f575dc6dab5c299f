//! # Orchestrator Control Client (C8)
//!
//! The spec treats "the orchestrator" as an abstract platform that owns a
//! native secret primitive and a set of workloads that consume it (spec
//! §2 GLOSSARY "Orchestrator", "Orchestrator-secret"). This module is the
//! daemon's one seam onto that platform, grounded in the teacher's
//! `controller/reconciler.rs` use of `kube::Api` + `PatchParams::apply` +
//! `Patch::Merge` for server-side-apply style mutation, generalized from a
//! CRD-status patcher into a full create/read/update/delete surface over
//! `Secret` (orchestrator-secret) and `Deployment` (workload).

use crate::error::OrchestratorError;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client};
use std::collections::BTreeMap;
use std::time::SystemTime;
use tracing::{debug, info, warn};

pub const FIELD_MANAGER: &str = "secret-sync-daemon";

/// Orchestrator-native secret payload keyed by field name, matching the
/// generic `BTreeMap<String, Vec<u8>>` shape of `k8s_openapi::Secret::data`
/// (spec §2 GLOSSARY "Orchestrator-secret").
pub type SecretData = BTreeMap<String, Vec<u8>>;

/// An existing orchestrator-secret's data plus its labels, returned by
/// `get_secret` so callers can copy labels onto a replacement object
/// verbatim (spec §4.6 step 2 "Copy all labels from the existing object").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrchestratorSecret {
    pub data: SecretData,
    pub labels: BTreeMap<String, String>,
}

/// Control-plane contract the rotation engine (C6) and driver assembly (C7)
/// mutate through. Kept trait-object-free call sites use a concrete type
/// directly; the trait exists so tests can substitute an in-memory fake
/// (spec §4.6 "no real network/cluster in tests").
#[async_trait]
pub trait OrchestratorClient: Send + Sync {
    /// Fetch the current data and labels of an orchestrator-secret, or
    /// `None` if it does not exist.
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<OrchestratorSecret>, OrchestratorError>;

    /// Create or replace an orchestrator-secret's data and labels in one
    /// atomic call (spec §4.6 "atomic swap").
    async fn put_secret(
        &self,
        namespace: &str,
        name: &str,
        data: SecretData,
        labels: BTreeMap<String, String>,
    ) -> Result<(), OrchestratorError>;

    /// Delete an orchestrator-secret. Idempotent: deleting an
    /// already-absent secret is not an error.
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), OrchestratorError>;

    /// List the consumer workload names whose pod template currently
    /// references `secret_name` as an environment or volume source. Used
    /// both by the rotation engine's stale-record pruning (spec §9 open
    /// question (a)) and as a cross-check against the registry's own
    /// `consumers` list.
    async fn list_consumers(&self, namespace: &str, secret_name: &str) -> Result<Vec<String>, OrchestratorError>;

    /// Rewrite every reference to `old_secret_name` in `workload_name`'s pod
    /// template to `new_secret_name`, preserving mount path, mode, uid, and
    /// gid (spec §4.6 step 3), then set the `<provider_id>.secret.rotated`
    /// label to the current Unix timestamp to force a rollout. A no-op, not
    /// an error, if the workload no longer exists.
    async fn rewire_workload(
        &self,
        namespace: &str,
        workload_name: &str,
        old_secret_name: &str,
        new_secret_name: &str,
        provider_id: &str,
    ) -> Result<(), OrchestratorError>;
}

/// Kubernetes-backed [`OrchestratorClient`]: `Secret` is the
/// orchestrator-secret, `Deployment` is the workload.
pub struct KubeOrchestrator {
    client: Client,
}

impl KubeOrchestrator {
    pub async fn connect() -> anyhow::Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl OrchestratorClient for KubeOrchestrator {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<OrchestratorSecret>, OrchestratorError> {
        match self.secrets(namespace).get(name).await {
            Ok(secret) => Ok(Some(OrchestratorSecret {
                data: secret
                    .data
                    .map(|data| data.into_iter().map(|(k, ByteString(bytes))| (k, bytes)).collect())
                    .unwrap_or_default(),
                labels: secret.metadata.labels.unwrap_or_default(),
            })),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(OrchestratorError::Operation(e.to_string())),
        }
    }

    async fn put_secret(
        &self,
        namespace: &str,
        name: &str,
        data: SecretData,
        labels: BTreeMap<String, String>,
    ) -> Result<(), OrchestratorError> {
        let api = self.secrets(namespace);
        let k8s_data: BTreeMap<String, ByteString> =
            data.into_iter().map(|(k, v)| (k, ByteString(v))).collect();

        let secret = Secret {
            metadata: kube::api::ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            data: Some(k8s_data),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        };

        match api.get(name).await {
            Ok(_) => {
                let patch = serde_json::json!({
                    "metadata": { "labels": secret.metadata.labels },
                    "data": secret.data,
                });
                api.patch(
                    name,
                    &PatchParams::apply(FIELD_MANAGER),
                    &Patch::Merge(patch),
                )
                .await
                .map_err(|e| OrchestratorError::Operation(e.to_string()))?;
                debug!("orchestrator: patched secret {namespace}/{name}");
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {
                api.create(&PostParams::default(), &secret)
                    .await
                    .map_err(|e| OrchestratorError::Operation(e.to_string()))?;
                info!("orchestrator: created secret {namespace}/{name}");
            }
            Err(e) => return Err(OrchestratorError::Operation(e.to_string())),
        }

        Ok(())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), OrchestratorError> {
        match self
            .secrets(namespace)
            .delete(name, &kube::api::DeleteParams::default())
            .await
        {
            Ok(_) => {
                info!("orchestrator: deleted secret {namespace}/{name}");
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(OrchestratorError::Operation(e.to_string())),
        }
    }

    async fn list_consumers(&self, namespace: &str, secret_name: &str) -> Result<Vec<String>, OrchestratorError> {
        let list = self
            .deployments(namespace)
            .list(&kube::api::ListParams::default())
            .await
            .map_err(|e| OrchestratorError::Operation(e.to_string()))?;

        let mut consumers = Vec::new();
        for deployment in list.items {
            let Some(name) = deployment.metadata.name.clone() else {
                continue;
            };
            if deployment_references_secret(&deployment, secret_name) {
                consumers.push(name);
            }
        }
        Ok(consumers)
    }

    async fn rewire_workload(
        &self,
        namespace: &str,
        workload_name: &str,
        old_secret_name: &str,
        new_secret_name: &str,
        provider_id: &str,
    ) -> Result<(), OrchestratorError> {
        let api = self.deployments(namespace);
        let mut deployment = match api.get(workload_name).await {
            Ok(d) => d,
            Err(kube::Error::Api(e)) if e.code == 404 => {
                warn!("orchestrator: workload {namespace}/{workload_name} no longer exists, skipping rewire");
                return Ok(());
            }
            Err(e) => return Err(OrchestratorError::Operation(e.to_string())),
        };

        let Some(spec) = deployment.spec.as_mut() else {
            return Ok(());
        };
        let Some(pod_spec) = spec.template.spec.as_mut() else {
            return Ok(());
        };

        // Rewrite every volume/envFrom/secretKeyRef reference to the old
        // secret name; mount path, mode, uid, gid live on the volume/mount
        // struct untouched here, so they are preserved automatically.
        for volume in pod_spec.volumes.iter_mut().flatten() {
            if let Some(source) = volume.secret.as_mut() {
                if source.secret_name.as_deref() == Some(old_secret_name) {
                    source.secret_name = Some(new_secret_name.to_string());
                }
            }
        }
        for container in pod_spec.containers.iter_mut() {
            for env_from in container.env_from.iter_mut().flatten() {
                if let Some(secret_ref) = env_from.secret_ref.as_mut() {
                    if secret_ref.name == old_secret_name {
                        secret_ref.name = new_secret_name.to_string();
                    }
                }
            }
            for env in container.env.iter_mut().flatten() {
                if let Some(secret_key_ref) = env
                    .value_from
                    .as_mut()
                    .and_then(|v| v.secret_key_ref.as_mut())
                {
                    if secret_key_ref.name == old_secret_name {
                        secret_key_ref.name = new_secret_name.to_string();
                    }
                }
            }
        }

        // Force a rollout by setting the rotation label (spec §4.6 step 3).
        let rotated_at = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("system clock is after the Unix epoch")
            .as_secs()
            .to_string();
        spec.template
            .metadata
            .get_or_insert_with(Default::default)
            .labels
            .get_or_insert_with(Default::default)
            .insert(format!("{provider_id}.secret.rotated"), rotated_at);

        let patch = serde_json::json!({ "spec": spec });
        api.patch(workload_name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await
            .map_err(|e| OrchestratorError::Operation(e.to_string()))?;

        info!(
            "orchestrator: rewired workload {namespace}/{workload_name} from secret {old_secret_name} to {new_secret_name}"
        );
        Ok(())
    }
}

fn deployment_references_secret(deployment: &Deployment, secret_name: &str) -> bool {
    let Some(spec) = &deployment.spec else {
        return false;
    };
    let pod_spec = &spec.template.spec;
    let Some(pod_spec) = pod_spec else {
        return false;
    };

    let volumes_match = pod_spec.volumes.iter().flatten().any(|v| {
        v.secret
            .as_ref()
            .and_then(|s| s.secret_name.as_deref())
            == Some(secret_name)
    });

    let env_from_match = pod_spec.containers.iter().any(|c| {
        c.env_from.iter().flatten().any(|e| {
            e.secret_ref
                .as_ref()
                .map(|r| r.name.as_str())
                == Some(secret_name)
        })
    });

    volumes_match || env_from_match
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// In-memory fake used by driver/rotation tests (spec §4.6 note "no real
    /// network/cluster in tests").
    #[derive(Default)]
    pub struct FakeOrchestrator {
        pub secrets: Mutex<BTreeMap<(String, String), OrchestratorSecret>>,
        pub consumers: Mutex<BTreeMap<String, Vec<String>>>,
        /// workload name -> secret name it currently references, so tests
        /// can assert the rewire actually moved the pointer.
        pub references: Mutex<BTreeMap<String, String>>,
    }

    #[async_trait]
    impl OrchestratorClient for FakeOrchestrator {
        async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<OrchestratorSecret>, OrchestratorError> {
            Ok(self
                .secrets
                .lock()
                .unwrap()
                .get(&(namespace.to_string(), name.to_string()))
                .cloned())
        }

        async fn put_secret(
            &self,
            namespace: &str,
            name: &str,
            data: SecretData,
            labels: BTreeMap<String, String>,
        ) -> Result<(), OrchestratorError> {
            self.secrets
                .lock()
                .unwrap()
                .insert((namespace.to_string(), name.to_string()), OrchestratorSecret { data, labels });
            Ok(())
        }

        async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), OrchestratorError> {
            self.secrets
                .lock()
                .unwrap()
                .remove(&(namespace.to_string(), name.to_string()));
            Ok(())
        }

        async fn list_consumers(&self, _namespace: &str, secret_name: &str) -> Result<Vec<String>, OrchestratorError> {
            Ok(self
                .consumers
                .lock()
                .unwrap()
                .get(secret_name)
                .cloned()
                .unwrap_or_default())
        }

        async fn rewire_workload(
            &self,
            _namespace: &str,
            workload_name: &str,
            _old_secret_name: &str,
            new_secret_name: &str,
            _provider_id: &str,
        ) -> Result<(), OrchestratorError> {
            self.references
                .lock()
                .unwrap()
                .insert(workload_name.to_string(), new_secret_name.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn fake_put_then_get_round_trips() {
        let fake = FakeOrchestrator::default();
        let mut data = SecretData::new();
        data.insert("value".to_string(), b"hunter2".to_vec());
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "billing".to_string());
        fake.put_secret("default", "db-creds", data.clone(), labels.clone()).await.unwrap();
        assert_eq!(
            fake.get_secret("default", "db-creds").await.unwrap(),
            Some(OrchestratorSecret { data, labels })
        );
    }

    #[tokio::test]
    async fn fake_delete_is_idempotent() {
        let fake = FakeOrchestrator::default();
        fake.delete_secret("default", "missing").await.unwrap();
        assert_eq!(fake.get_secret("default", "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn fake_rewire_records_new_reference() {
        let fake = FakeOrchestrator::default();
        fake.rewire_workload("default", "api", "db-old", "db-new", "vault").await.unwrap();
        assert_eq!(fake.references.lock().unwrap().get("api").map(String::as_str), Some("db-new"));
    }
}
