//! # Error Types
//!
//! Error kinds for every layer of the daemon, matching the disposition table in
//! the spec's error handling design: validation errors are synchronous and
//! surfaced verbatim, provider errors are split into transient/permanent so the
//! rotation engine can tell "retry later" apart from "this will never work",
//! and orchestrator-mutation errors stay internal to the rotation engine.

use thiserror::Error;

/// Errors raised while deriving a backend locator from a fetch request (C1).
#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("secret name is required")]
    MissingSecretName,
}

/// Errors raised while extracting a delivery value from a backend payload (C2).
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("field {field:?} not found in payload; available keys: {available:?}")]
    FieldNotFound {
        field: String,
        available: Vec<String>,
    },
    #[error("payload has no suitable string value")]
    NoSuitableValue,
}

/// Errors raised by a provider adapter (C3).
///
/// `Transient` covers network/auth faults that are expected to clear up on
/// their own; `Permanent` covers faults that will not resolve without operator
/// intervention (secret not found, field absent, malformed payload).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transient error from provider {provider}: {message}")]
    Transient { provider: String, message: String },

    #[error("permanent error from provider {provider}: {message}")]
    Permanent { provider: String, message: String },
}

impl ProviderError {
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn permanent(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Permanent {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether this error should ever be treated as a detected change by
    /// `check_changed` call sites. Per spec §4.3, it never should: errors of
    /// either kind return `false`/"no change" to the caller and propagate for
    /// logging.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl From<ExtractError> for ProviderError {
    fn from(err: ExtractError) -> Self {
        ProviderError::permanent("extractor", err.to_string())
    }
}

impl From<LocatorError> for ProviderError {
    fn from(err: LocatorError) -> Self {
        ProviderError::permanent("locator", err.to_string())
    }
}

/// Errors surfaced by the synchronous fetch driver (C5).
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("secret name is required")]
    Validation(#[from] LocatorError),

    #[error("{0}")]
    Provider(#[from] ProviderError),

    #[error("fetch timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl DriverError {
    /// The message delivered verbatim to the orchestrator, per spec §4.5.3.
    pub fn message(&self) -> String {
        match self {
            DriverError::Validation(_) => "secret name is required".to_string(),
            DriverError::Provider(ProviderError::Transient { message, .. })
            | DriverError::Provider(ProviderError::Permanent { message, .. }) => message.clone(),
            DriverError::Timeout(d) => format!("fetch timed out after {d:?}"),
        }
    }
}

/// Errors raised by the orchestrator control client (C8), used internally by
/// the rotation engine (C6). Never surfaced to the synchronous fetch path.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("orchestrator-secret {0:?} not found")]
    SecretNotFound(String),

    #[error("orchestrator operation failed: {0}")]
    Operation(String),
}

/// Errors raised by one pass of the rotation engine over a single tracking
/// record. These are always logged and never propagate out of the tick loop.
#[derive(Debug, Error)]
pub enum RotationError {
    #[error("change detection failed: {0}")]
    CheckFailed(#[source] ProviderError),

    #[error("fetch of new value failed: {0}")]
    FetchFailed(#[source] ProviderError),

    #[error("orchestrator mutation failed: {0}")]
    MutationFailed(#[source] OrchestratorError),
}
