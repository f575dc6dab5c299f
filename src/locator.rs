//! # Path/Name Derivation (C1)
//!
//! Deterministic mapping from a [`FetchRequest`] to a backend-specific locator
//! string, per spec §4.1. Each provider owns a pure `locate` function built on
//! top of the shared default-composition and sanitization rules here.

use crate::error::LocatorError;
use crate::types::FetchRequest;

/// Shape of the default locator a backend wants when no label override is
/// present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorStyle {
    /// `<mount>/data/<service>/<name>` (KV-v2) or `<mount>/<service>/<name>`
    /// when `mount` is not the KV-v2 default mount.
    KvHierarchy,
    /// `<service>/<name>` slash-joined.
    FlatNamespace,
    /// `<service>-<name>` joined with `-`, then Key-Vault sanitized.
    KeyVaultStyle,
    /// `<service>-<name>` joined with `-`, then Resource-ID sanitized.
    ResourceIdStyle,
}

fn default_compose(request: &FetchRequest, style: LocatorStyle, mount: &str) -> String {
    match style {
        LocatorStyle::KvHierarchy => {
            let kv2_default_mount = mount == "secret";
            let infix = if kv2_default_mount { "/data" } else { "" };
            match &request.service_name {
                Some(service) if !service.is_empty() => {
                    format!("{mount}{infix}/{service}/{}", request.secret_name)
                }
                _ => format!("{mount}{infix}/{}", request.secret_name),
            }
        }
        LocatorStyle::FlatNamespace => match &request.service_name {
            Some(service) if !service.is_empty() => {
                format!("{service}/{}", request.secret_name)
            }
            _ => request.secret_name.clone(),
        },
        LocatorStyle::KeyVaultStyle => {
            let joined = join_with_service(request, "-");
            sanitize_key_vault_style(&joined)
        }
        LocatorStyle::ResourceIdStyle => {
            let joined = join_with_service(request, "-");
            sanitize_resource_id_style(&joined)
        }
    }
}

fn join_with_service(request: &FetchRequest, sep: &str) -> String {
    match &request.service_name {
        Some(service) if !service.is_empty() => {
            format!("{service}{sep}{}", request.secret_name)
        }
        _ => request.secret_name.clone(),
    }
}

/// Key-Vault-style sanitization: `^[0-9A-Za-z-]+$`, per spec §4.1.
pub fn sanitize_key_vault_style(raw: &str) -> String {
    const FALLBACK: &str = "secret";

    let mut replaced = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            replaced.push(ch);
        } else {
            replaced.push('-');
        }
    }

    let mut collapsed = String::with_capacity(replaced.len());
    let mut prev_dash = false;
    for ch in replaced.chars() {
        if ch == '-' {
            if !prev_dash {
                collapsed.push(ch);
            }
            prev_dash = true;
        } else {
            collapsed.push(ch);
            prev_dash = false;
        }
    }

    let trimmed = collapsed.trim_matches('-');
    if trimmed.is_empty() {
        FALLBACK.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Resource-ID-style sanitization: first rune must be a letter, subsequent
/// runes in `[A-Za-z0-9_-]`, per spec §4.1.
pub fn sanitize_resource_id_style(raw: &str) -> String {
    const FALLBACK_PREFIX: char = 'r';

    let mut chars = raw.chars();
    let mut out = String::with_capacity(raw.len() + 1);

    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => out.push(first),
        Some(first) => {
            out.push(FALLBACK_PREFIX);
            out.push(if first.is_ascii_alphanumeric() || first == '_' || first == '-' {
                first
            } else {
                '_'
            });
        }
        None => out.push(FALLBACK_PREFIX),
    }

    for ch in chars {
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }

    out
}

/// Derive the locator for `request` given a provider's override label key,
/// default composition style, and (for KV-hierarchy backends) mount name.
///
/// Override values are used verbatim — sanitization only ever applies to the
/// default-composed name (spec §4.1).
pub fn locate(
    request: &FetchRequest,
    override_label: &str,
    style: LocatorStyle,
    mount: &str,
) -> Result<String, LocatorError> {
    if request.secret_name.is_empty() {
        return Err(LocatorError::MissingSecretName);
    }

    if let Some(overridden) = request.label(override_label) {
        return Ok(overridden.to_string());
    }

    Ok(default_compose(request, style, mount))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(name: &str, service: Option<&str>) -> FetchRequest {
        let mut r = FetchRequest::new(name);
        if let Some(s) = service {
            r = r.with_service_name(s);
        }
        r
    }

    #[test]
    fn kv_hierarchy_default_mount_uses_data_infix() {
        let r = req("db", Some("app"));
        let locator = locate(&r, "vault_path", LocatorStyle::KvHierarchy, "secret").unwrap();
        assert_eq!(locator, "secret/data/app/db");
    }

    #[test]
    fn kv_hierarchy_non_default_mount_omits_data_infix() {
        let r = req("db", Some("app"));
        let locator = locate(&r, "vault_path", LocatorStyle::KvHierarchy, "kv2").unwrap();
        assert_eq!(locator, "kv2/app/db");
    }

    #[test]
    fn kv_hierarchy_no_service_omits_service_segment() {
        let r = req("db", None);
        let locator = locate(&r, "vault_path", LocatorStyle::KvHierarchy, "secret").unwrap();
        assert_eq!(locator, "secret/data/db");
    }

    #[test]
    fn flat_namespace_joins_service_and_name() {
        let r = req("api-key", Some("prod"));
        let locator = locate(&r, "aws_secret_name", LocatorStyle::FlatNamespace, "").unwrap();
        assert_eq!(locator, "prod/api-key");
    }

    #[test]
    fn flat_namespace_without_service_uses_name_alone() {
        let r = req("api-key", None);
        let locator = locate(&r, "aws_secret_name", LocatorStyle::FlatNamespace, "").unwrap();
        assert_eq!(locator, "api-key");
    }

    #[test]
    fn key_vault_style_sanitizes_disallowed_characters() {
        let r = req("my_secret!", Some("svc"));
        let locator = locate(&r, "azure_secret_name", LocatorStyle::KeyVaultStyle, "").unwrap();
        assert_eq!(locator, "svc-my-secret");
    }

    #[test]
    fn key_vault_style_empty_result_falls_back() {
        assert_eq!(sanitize_key_vault_style("!!!"), "secret");
    }

    #[test]
    fn resource_id_style_prepends_letter_when_first_rune_invalid() {
        let r = req("1secret", Some("svc"));
        let locator =
            locate(&r, "gcp_secret_name", LocatorStyle::ResourceIdStyle, "").unwrap();
        assert_eq!(locator, "svc-1secret");
    }

    #[test]
    fn resource_id_style_replaces_disallowed_runes_with_underscore() {
        assert_eq!(sanitize_resource_id_style("a.b c"), "a_b_c");
    }

    #[test]
    fn label_override_is_used_verbatim_unsanitized() {
        let r = req("anything", Some("svc")).with_label("azure_secret_name", "weird!name");
        let locator = locate(&r, "azure_secret_name", LocatorStyle::KeyVaultStyle, "").unwrap();
        assert_eq!(locator, "weird!name");
    }

    #[test]
    fn empty_secret_name_is_rejected() {
        let r = FetchRequest::new("");
        let err = locate(&r, "vault_path", LocatorStyle::KvHierarchy, "secret").unwrap_err();
        assert!(matches!(err, LocatorError::MissingSecretName));
    }
}
