//! # Provider Adapters (C3)
//!
//! One adapter per backend, each implementing [`SecretProvider`] on top of
//! the shared locator (C1) and extractor (C2), per spec §4.3.
//!
//! Providers are dispatched through a tagged variant ([`AnyProvider`]), not an
//! inheritance hierarchy (spec §9 "Variant over providers"): the registry and
//! extractor stay untyped over which provider produced a given record.

use crate::error::ProviderError;
use crate::types::{FetchRequest, TrackingRecord};
use async_trait::async_trait;
use std::collections::HashMap;

pub mod aws;
pub mod azure;
pub mod gcp;
pub mod vault;

/// Flat string map handed to `init`; the adapter selects what it needs from
/// the full process environment (spec §4.7).
pub type ProviderConfig = HashMap<String, String>;

/// Shared provider contract (spec §4.3 table).
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Fetch and extract the delivery bytes for `request`.
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<u8>, ProviderError>;

    /// Whether this adapter participates in the rotation loop at all.
    fn supports_rotation(&self) -> bool;

    /// Re-fetch the value at `record.locator`/`record.field` (not the
    /// original request) and compare its fingerprint to `record.fingerprint`.
    ///
    /// Errors are never treated as a detected change: call sites must treat
    /// an `Err` as "no change" and log it (spec §4.3).
    async fn check_changed(&self, record: &TrackingRecord) -> Result<bool, ProviderError>;

    /// Short, stable identifier used as `TrackingRecord::provider_id` and in
    /// the label-override key names (`<provider_id>_path`, etc).
    fn provider_id(&self) -> &'static str;

    /// Best-effort teardown; failures are logged but never fatal (spec
    /// §4.3 table).
    async fn close(&self);
}

/// Derive `do_not_reuse` per spec §4.5 step 5.
///
/// An explicit `"<provider>_reuse"` or generic `"reuse"` label set to the
/// literal string `"false"` (case-insensitive) always wins; otherwise the
/// substring heuristic documented as an open question in spec §9(b) applies.
pub fn derive_do_not_reuse(provider_id: &str, secret_name: &str, labels: &FetchRequest) -> bool {
    let reuse_key = format!("{provider_id}_reuse");
    let explicit = labels
        .label(&reuse_key)
        .or_else(|| labels.label("reuse"));

    if let Some(value) = explicit {
        if value.eq_ignore_ascii_case("false") {
            return true;
        }
    }

    const DO_NOT_REUSE_SUBSTRINGS: &[&str] = &["cert", "token", "dynamic"];
    DO_NOT_REUSE_SUBSTRINGS
        .iter()
        .any(|needle| secret_name.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(name: &str) -> FetchRequest {
        FetchRequest::new(name)
    }

    #[test]
    fn cert_token_dynamic_force_do_not_reuse() {
        assert!(derive_do_not_reuse("vault", "foo-cert", &req("foo-cert")));
        assert!(derive_do_not_reuse("vault", "x_token", &req("x_token")));
        assert!(derive_do_not_reuse("vault", "dynamic-db", &req("dynamic-db")));
    }

    #[test]
    fn unrelated_name_is_reusable() {
        assert!(!derive_do_not_reuse("vault", "password", &req("password")));
    }

    #[test]
    fn explicit_reuse_false_label_forces_do_not_reuse() {
        let r = req("password").with_label("vault_reuse", "FALSE");
        assert!(derive_do_not_reuse("vault", "password", &r));
    }

    #[test]
    fn explicit_generic_reuse_label_also_applies() {
        let r = req("password").with_label("reuse", "false");
        assert!(derive_do_not_reuse("vault", "password", &r));
    }

    #[test]
    fn reuse_true_label_does_not_override_heuristic() {
        let r = req("foo-cert").with_label("vault_reuse", "true");
        assert!(derive_do_not_reuse("vault", "foo-cert", &r));
    }
}
