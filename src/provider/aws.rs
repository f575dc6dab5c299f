//! # AWS Secrets Manager Adapter
//!
//! Grounded in the teacher's `provider/aws` module (same SDK, same
//! default-credential-chain-vs-explicit-keys auth split); fetch-oriented
//! instead of create-or-update-oriented.

use crate::error::ProviderError;
use crate::extractor;
use crate::locator::{locate, LocatorStyle};
use crate::provider::{ProviderConfig, SecretProvider};
use crate::types::{sha256_hex, FetchRequest, TrackingRecord};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use tracing::{debug, info};

pub struct AwsProvider {
    client: SecretsManagerClient,
    region: String,
}

impl AwsProvider {
    /// Recognized keys: `AWS_REGION` (required), and either the SDK default
    /// credential chain (no explicit keys) or `AWS_ACCESS_KEY_ID` +
    /// `AWS_SECRET_ACCESS_KEY` (+ optional `AWS_SESSION_TOKEN`) as an
    /// explicit override, per spec §4.3 "Cloud SDK default chain".
    pub async fn init(config: &ProviderConfig) -> anyhow::Result<Self> {
        let region = config
            .get("AWS_REGION")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("AWS_REGION is required"))?;

        let mut builder = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.clone()));

        if let (Some(access_key), Some(secret_key)) = (
            config.get("AWS_ACCESS_KEY_ID"),
            config.get("AWS_SECRET_ACCESS_KEY"),
        ) {
            info!("aws: using explicit static credentials");
            let creds = Credentials::new(
                access_key,
                secret_key,
                config.get("AWS_SESSION_TOKEN").cloned(),
                None,
                "secret-sync-daemon-static",
            );
            builder = builder.credentials_provider(creds);
        } else {
            info!("aws: using SDK default credential chain");
        }

        let sdk_config = builder.load().await;
        let client = SecretsManagerClient::new(&sdk_config);

        Ok(Self { client, region })
    }

    fn locate(&self, request: &FetchRequest) -> Result<String, ProviderError> {
        locate(request, "aws_secret_name", LocatorStyle::FlatNamespace, "")
            .map_err(ProviderError::from)
    }

    async fn fetch_raw(&self, locator: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .get_secret_value()
            .secret_id(locator)
            .send()
            .await
            .map_err(|e| classify_aws_error(&e.to_string()))?;

        if let Some(s) = response.secret_string() {
            Ok(s.as_bytes().to_vec())
        } else if let Some(b) = response.secret_binary() {
            Ok(b.as_ref().to_vec())
        } else {
            Err(ProviderError::permanent(
                "aws",
                format!("secret {locator} has neither SecretString nor SecretBinary"),
            ))
        }
    }
}

fn classify_aws_error(message: &str) -> ProviderError {
    if message.contains("ResourceNotFoundException") {
        ProviderError::permanent("aws", format!("secret not found: {message}"))
    } else {
        ProviderError::transient("aws", message.to_string())
    }
}

#[async_trait]
impl SecretProvider for AwsProvider {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<u8>, ProviderError> {
        let locator = self.locate(request)?;
        let raw = self.fetch_raw(&locator).await?;
        extractor::extract(&raw, request, "aws_field", false).map_err(ProviderError::from)
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
            FetchRequest::new(&record.orch_secret_name).with_label("aws_field", &record.field)
        };
        let extracted = extractor::extract(&raw, &synthetic, "aws_field", false)?;
        Ok(sha256_hex(&extracted) != record.fingerprint)
    }

    fn provider_id(&self) -> &'static str {
        "aws"
    }

    async fn close(&self) {
        debug!("aws ({}): closing client (no-op, connection-pooled HTTP client)", self.region);
    }
}

impl std::fmt::Debug for AwsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsProvider").field("region", &self.region).finish_non_exhaustive()
    }
}
