//! # Azure Key Vault Adapter
//!
//! Grounded in the teacher's `provider/azure/key_vault.rs` (official
//! `azure_security_keyvault_secrets` + `azure_identity` SDKs).

use crate::error::ProviderError;
use crate::extractor;
use crate::locator::{locate, LocatorStyle};
use crate::provider::{ProviderConfig, SecretProvider};
use crate::types::{sha256_hex, FetchRequest, TrackingRecord};
use async_trait::async_trait;
use azure_identity::{ClientSecretCredential, DefaultAzureCredential};
use azure_security_keyvault_secrets::models::Secret as AzureSecretModel;
use azure_security_keyvault_secrets::SecretClient;
use std::sync::Arc;
use tracing::{debug, info};

pub struct AzureProvider {
    client: SecretClient,
    vault_name: String,
}

impl AzureProvider {
    /// Recognized keys: `AZURE_VAULT_NAME` (required). Authentication is
    /// Service Principal (`AZURE_TENANT_ID` + `AZURE_CLIENT_ID` +
    /// `AZURE_CLIENT_SECRET`) if all three are present, else the SDK default
    /// credential chain (managed identity, workload identity, env vars),
    /// per spec §4.3 "Service-principal".
    pub async fn init(config: &ProviderConfig) -> anyhow::Result<Self> {
        let vault_name = config
            .get("AZURE_VAULT_NAME")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("AZURE_VAULT_NAME is required"))?;
        let vault_url = if vault_name.starts_with("https://") {
            vault_name.clone()
        } else {
            format!("https://{vault_name}.vault.azure.net/")
        };

        let credential: Arc<dyn azure_core::credentials::TokenCredential> = match (
            config.get("AZURE_TENANT_ID"),
            config.get("AZURE_CLIENT_ID"),
            config.get("AZURE_CLIENT_SECRET"),
        ) {
            (Some(tenant), Some(client), Some(secret)) => {
                info!("azure: using service principal authentication");
                ClientSecretCredential::new(tenant, client.clone(), secret.clone().into(), None)
                    .map_err(|e| anyhow::anyhow!("failed to build service principal credential: {e}"))?
            }
            _ => {
                info!("azure: using default credential chain (managed/workload identity)");
                DefaultAzureCredential::new()
                    .map_err(|e| anyhow::anyhow!("failed to build default credential: {e}"))?
            }
        };

        let client = SecretClient::new(&vault_url, credential, None)
            .map_err(|e| anyhow::anyhow!("failed to build Key Vault client: {e}"))?;

        Ok(Self { client, vault_name })
    }

    fn locate(&self, request: &FetchRequest) -> Result<String, ProviderError> {
        locate(request, "azure_secret_name", LocatorStyle::KeyVaultStyle, "")
            .map_err(ProviderError::from)
    }

    async fn fetch_raw(&self, locator: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .get_secret(locator, "", None)
            .await
            .map_err(|e| classify_azure_error(&e.to_string()))?;

        let secret: AzureSecretModel = response
            .into_body()
            .await
            .map_err(|e| ProviderError::permanent("azure", format!("malformed secret body: {e}")))?;

        let value = secret
            .value
            .ok_or_else(|| ProviderError::permanent("azure", format!("secret {locator} has no value")))?;

        Ok(value.into_bytes())
    }
}

fn classify_azure_error(message: &str) -> ProviderError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("secretnotfound") || lower.contains("404") || lower.contains("not found") {
        ProviderError::permanent("azure", format!("secret not found: {message}"))
    } else {
        ProviderError::transient("azure", message.to_string())
    }
}

#[async_trait]
impl SecretProvider for AzureProvider {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<u8>, ProviderError> {
        let locator = self.locate(request)?;
        let raw = self.fetch_raw(&locator).await?;
        extractor::extract(&raw, request, "azure_field", false).map_err(ProviderError::from)
    }

    fn supports_rotation(&self) -> bool {
        true
    }

    async fn check_changed(&self, record: &TrackingRecord) -> Result<bool, ProviderError> {
        let raw = self.fetch_raw(&record.locator).await?;
        // Reproduce exactly how the delivered bytes were originally derived:
        // the sentinel `WHOLE_VALUE_FIELD` means the original fetch used
        // default extraction (no field-override label), so re-extract the
        // same way rather than forcing a literal `"value"` field lookup.
        let synthetic = if record.field == extractor::WHOLE_VALUE_FIELD {
            FetchRequest::new(&record.orch_secret_name)
        } else {
            FetchRequest::new(&record.orch_secret_name).with_label("azure_field", &record.field)
        };
        let extracted = extractor::extract(&raw, &synthetic, "azure_field", false)?;
        Ok(sha256_hex(&extracted) != record.fingerprint)
    }

    fn provider_id(&self) -> &'static str {
        "azure"
    }

    async fn close(&self) {
        debug!("azure ({}): closing client (no-op, HTTP pipeline is reference-counted)", self.vault_name);
    }
}

impl std::fmt::Debug for AzureProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureProvider")
            .field("vault_name", &self.vault_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_not_found_variants_as_permanent() {
        assert!(!classify_azure_error("SecretNotFound").is_transient());
        assert!(!classify_azure_error("Response status code 404").is_transient());
        assert!(!classify_azure_error("the secret was not found in the vault").is_transient());
    }

    #[test]
    fn classify_other_errors_as_transient() {
        assert!(classify_azure_error("connection timed out").is_transient());
    }
}
