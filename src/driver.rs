//! # Fetch Driver (C5)
//!
//! Synchronous "give me the bytes for secret X" entry point invoked per
//! orchestrator request (spec §4.5). Delegates to the provider (C3) and, when
//! rotation applies, tags the tracking registry (C4) with the locator and
//! consumer it just observed.

use crate::error::{DriverError, ProviderError};
use crate::locator::{locate, LocatorStyle};
use crate::observability::metrics;
use crate::provider::{derive_do_not_reuse, SecretProvider};
use crate::registry::Registry;
use crate::types::{FetchRequest, FetchResponse};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::info;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct FetchDriver {
    provider: Arc<dyn SecretProvider>,
    registry: Arc<Registry>,
    rotation_enabled: bool,
    locator_style: LocatorStyle,
    locator_override_label: String,
    field_override_label: String,
    locator_mount: String,
}

impl FetchDriver {
    pub fn new(
        provider: Arc<dyn SecretProvider>,
        registry: Arc<Registry>,
        rotation_enabled: bool,
        locator_style: LocatorStyle,
        locator_override_label: impl Into<String>,
        field_override_label: impl Into<String>,
        locator_mount: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            registry,
            rotation_enabled,
            locator_style,
            locator_override_label: locator_override_label.into(),
            field_override_label: field_override_label.into(),
            locator_mount: locator_mount.into(),
        }
    }

    /// Serve one fetch request end-to-end (spec §4.5 steps 1-6).
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, DriverError> {
        metrics::increment_fetches();

        if request.secret_name.trim().is_empty() {
            metrics::increment_fetch_errors("validation");
            return Err(DriverError::Validation(crate::error::LocatorError::MissingSecretName));
        }

        let started = Instant::now();
        let value = match tokio::time::timeout(FETCH_TIMEOUT, self.provider.fetch(request)).await {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => {
                metrics::increment_fetch_errors(if err.is_transient() { "provider_transient" } else { "provider_permanent" });
                return Err(DriverError::Provider(err));
            }
            Err(_) => {
                metrics::increment_fetch_errors("timeout");
                return Err(DriverError::Timeout(FETCH_TIMEOUT));
            }
        };
        metrics::observe_fetch_duration(started.elapsed().as_secs_f64());
        metrics::observe_provider_operation_duration(self.provider.provider_id(), started.elapsed().as_secs_f64());

        if self.rotation_enabled && self.provider.supports_rotation() {
            let computed_locator = locate(
                request,
                &self.locator_override_label,
                self.locator_style,
                &self.locator_mount,
            )
            .map_err(|err| {
                metrics::increment_fetch_errors("validation");
                DriverError::Validation(err)
            })?;

            let field = request
                .label(&self.field_override_label)
                .unwrap_or(crate::extractor::WHOLE_VALUE_FIELD)
                .to_string();

            self.registry
                .upsert(
                    &request.secret_name,
                    self.provider.provider_id(),
                    &computed_locator,
                    &field,
                    request.service_name.as_deref(),
                    &value,
                    SystemTime::now(),
                )
                .await;
            info!(
                secret_name = %request.secret_name,
                provider = self.provider.provider_id(),
                "tracked fetch for rotation"
            );
        }

        let do_not_reuse = derive_do_not_reuse(self.provider.provider_id(), &request.secret_name, request);

        Ok(FetchResponse {
            value,
            do_not_reuse,
        })
    }
}

/// Surfaces a provider error's transience without constructing a full
/// [`DriverError`], used by callers that only care whether a retry is worth
/// scheduling (spec §7 disposition table).
pub fn is_retryable(err: &DriverError) -> bool {
    matches!(err, DriverError::Provider(ProviderError::Transient { .. }) | DriverError::Timeout(_))
}
