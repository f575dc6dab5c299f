//! # Vault / OpenBao Adapter
//!
//! Covers both the `vault` and `openbao` `provider_id`s named in spec §3:
//! OpenBao is wire-compatible with HashiCorp Vault's KV v2 and AppRole APIs,
//! so one adapter parameterized by base address and `provider_id` serves
//! both, matching the teacher's one-adapter-per-SDK pattern while avoiding a
//! pointless duplicate client.

use crate::error::ProviderError;
use crate::extractor;
use crate::locator::{locate, LocatorStyle};
use crate::provider::{ProviderConfig, SecretProvider};
use crate::types::{sha256_hex, FetchRequest, TrackingRecord};
use async_trait::async_trait;
use tracing::{debug, info};
use vaultrs::auth::approle;
use vaultrs::client::{Client, VaultClient, VaultClientSettingsBuilder};
use vaultrs::kv2;

/// `vault` or `openbao`.
pub struct VaultProvider {
    client: VaultClient,
    mount: String,
    provider_id: &'static str,
    field_label: &'static str,
    path_label: &'static str,
}

impl VaultProvider {
    /// Build from a flat config map (spec §4.3 "Authentication shapes").
    ///
    /// Recognized keys (for `provider_id = "vault"`; `openbao` uses the
    /// `OPENBAO_*` equivalents):
    /// - `VAULT_ADDR` (required)
    /// - `VAULT_MOUNT` (default `"secret"`)
    /// - `VAULT_TOKEN` (static-token auth)
    /// - `VAULT_ROLE_ID` + `VAULT_SECRET_ID` (AppRole auth, tried if token absent)
    pub async fn init(config: &ProviderConfig, provider_id: &'static str) -> anyhow::Result<Self> {
        let prefix = provider_id.to_uppercase();
        let addr = config
            .get(&format!("{prefix}_ADDR"))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{prefix}_ADDR is required"))?;
        let mount = config
            .get(&format!("{prefix}_MOUNT"))
            .cloned()
            .unwrap_or_else(|| "secret".to_string());

        let settings = VaultClientSettingsBuilder::default()
            .address(&addr)
            .build()?;
        let mut client = VaultClient::new(settings)?;

        if let Some(token) = config.get(&format!("{prefix}_TOKEN")) {
            info!("{provider_id}: using static token authentication");
            client.set_token(token);
        } else if let (Some(role_id), Some(secret_id)) = (
            config.get(&format!("{prefix}_ROLE_ID")),
            config.get(&format!("{prefix}_SECRET_ID")),
        ) {
            info!("{provider_id}: exchanging AppRole credentials for a client token");
            let login = approle::login(&client, "approle", role_id, secret_id)
                .await
                .map_err(|e| anyhow::anyhow!("{provider_id} AppRole login failed: {e}"))?;
            client.set_token(&login.client_token);
        } else {
            anyhow::bail!(
                "{prefix}_TOKEN or ({prefix}_ROLE_ID and {prefix}_SECRET_ID) is required"
            );
        }

        let (field_label, path_label): (&'static str, &'static str) = if provider_id == "openbao"
        {
            ("openbao_field", "openbao_path")
        } else {
            ("vault_field", "vault_path")
        };

        Ok(Self {
            client,
            mount,
            provider_id,
            field_label,
            path_label,
        })
    }

    fn locate(&self, request: &FetchRequest) -> Result<String, ProviderError> {
        locate(request, self.path_label, LocatorStyle::KvHierarchy, &self.mount)
            .map_err(ProviderError::from)
    }

    /// `locator` is the full composed path (e.g. `secret/data/app/db`); strip
    /// the mount and the KV-v2 `data/` infix to get the raw path vaultrs
    /// wants, since the locator is the *display* path while the SDK wants
    /// mount and path passed separately.
    fn split_locator<'a>(&self, locator: &'a str) -> &'a str {
        let without_mount = locator
            .strip_prefix(&format!("{}/", self.mount))
            .unwrap_or(locator);
        without_mount.strip_prefix("data/").unwrap_or(without_mount)
    }

    async fn fetch_raw(&self, path: &str) -> Result<Vec<u8>, ProviderError> {
        let inner: serde_json::Value = kv2::read(&self.client, &self.mount, path)
            .await
            .map_err(|e| classify_vault_error(self.provider_id, &e.to_string()))?;
        let envelope = serde_json::json!({ "data": inner });
        Ok(serde_json::to_vec(&envelope).expect("serializing a JSON value cannot fail"))
    }
}

fn classify_vault_error(provider_id: &str, message: &str) -> ProviderError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("404") || lower.contains("not found") {
        ProviderError::permanent(provider_id, format!("secret not found: {message}"))
    } else {
        ProviderError::transient(provider_id, message.to_string())
    }
}

#[async_trait]
impl SecretProvider for VaultProvider {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<u8>, ProviderError> {
        let locator = self.locate(request)?;
        let path = self.split_locator(&locator);
        let raw = self.fetch_raw(path).await?;
        extractor::extract(&raw, request, self.field_label, true).map_err(ProviderError::from)
    }

    fn supports_rotation(&self) -> bool {
        true
    }

    async fn check_changed(&self, record: &TrackingRecord) -> Result<bool, ProviderError> {
        let path = self.split_locator(&record.locator);
        let raw = self.fetch_raw(path).await?;

        // Reproduce exactly how the delivered bytes were originally derived:
        // the driver stores `extractor::WHOLE_VALUE_FIELD` for every fetch
        // that used default extraction (no field-override label), so that
        // sentinel must re-extract with no override rather than forcing a
        // literal `"value"` field lookup.
        let synthetic = if record.field == extractor::WHOLE_VALUE_FIELD {
            FetchRequest::new(&record.orch_secret_name)
        } else {
            FetchRequest::new(&record.orch_secret_name).with_label(self.field_label, &record.field)
        };
        let extracted = extractor::extract(&raw, &synthetic, self.field_label, true)?;

        Ok(sha256_hex(&extracted) != record.fingerprint)
    }

    fn provider_id(&self) -> &'static str {
        self.provider_id
    }

    async fn close(&self) {
        debug!("{}: closing client (no-op, connectionless HTTP client)", self.provider_id);
    }
}

impl std::fmt::Debug for VaultProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultProvider")
            .field("provider_id", &self.provider_id)
            .field("mount", &self.mount)
            .finish_non_exhaustive()
    }
}
