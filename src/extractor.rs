//! # Payload Extractor (C2)
//!
//! Given a backend payload (opaque bytes or a structured JSON document) and
//! request metadata, produce the single byte string to deliver, per spec
//! §4.2. Identical across providers; KV-hierarchy adapters unwrap their
//! `data.data` envelope before calling in.

use crate::error::ExtractError;
use crate::types::FetchRequest;
use serde_json::Value;

/// Default field-priority order used when no field override is given (spec
/// §4.2 step 2).
const DEFAULT_FIELD_PRIORITY: &[&str] = &["value", "password", "secret", "data"];

/// The sentinel field name meaning "whole payload" (also used as the
/// `TrackingRecord::field` value when no override is present).
pub const WHOLE_VALUE_FIELD: &str = "value";

/// Extract the bytes to deliver for `request` from a raw backend payload.
///
/// `field_override_label` is the adapter's label key for explicit field
/// selection (e.g. `vault_field`). `unwrap_kv_envelope` is applied only for
/// KV-hierarchy backends: if the top-level JSON object has a `"data"` field
/// whose value is itself an object, that inner object becomes the payload
/// before steps 1-3 run (spec §4.2, final paragraph).
pub fn extract(
    payload: &[u8],
    request: &FetchRequest,
    field_override_label: &str,
    unwrap_kv_envelope: bool,
) -> Result<Vec<u8>, ExtractError> {
    let parsed: Option<Value> = serde_json::from_slice(payload).ok();

    let effective = match (&parsed, unwrap_kv_envelope) {
        (Some(Value::Object(map)), true) => match map.get("data") {
            Some(inner @ Value::Object(_)) => Some(inner.clone()),
            _ => parsed.clone(),
        },
        _ => parsed.clone(),
    };

    if let Some(field) = request.label(field_override_label) {
        return extract_named_field(payload, effective.as_ref(), field);
    }

    match effective {
        Some(Value::Object(map)) => extract_default_field(&map),
        _ => Ok(payload.to_vec()),
    }
}

fn extract_named_field(
    raw_payload: &[u8],
    effective: Option<&Value>,
    field: &str,
) -> Result<Vec<u8>, ExtractError> {
    match effective {
        Some(Value::Object(map)) => match map.get(field) {
            Some(v) => Ok(value_to_string(v).into_bytes()),
            None => Err(ExtractError::FieldNotFound {
                field: field.to_string(),
                available: map.keys().cloned().collect(),
            }),
        },
        _ if field == WHOLE_VALUE_FIELD => Ok(raw_payload.to_vec()),
        _ => Err(ExtractError::FieldNotFound {
            field: field.to_string(),
            available: Vec::new(),
        }),
    }
}

fn extract_default_field(map: &serde_json::Map<String, Value>) -> Result<Vec<u8>, ExtractError> {
    for candidate in DEFAULT_FIELD_PRIORITY {
        if let Some(v) = map.get(*candidate) {
            return Ok(value_to_string(v).into_bytes());
        }
    }

    for v in map.values() {
        if let Value::String(s) = v {
            return Ok(s.clone().into_bytes());
        }
    }

    Err(ExtractError::NoSuitableValue)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_json_payload_returns_verbatim() {
        let req = FetchRequest::new("x");
        let out = extract(b"plain-bytes", &req, "vault_field", false).unwrap();
        assert_eq!(out, b"plain-bytes");
    }

    #[test]
    fn json_with_value_field_returns_value() {
        let req = FetchRequest::new("x");
        let out = extract(br#"{"value":"x"}"#, &req, "vault_field", false).unwrap();
        assert_eq!(out, b"x");
    }

    #[test]
    fn json_without_default_field_but_with_string_field_returns_it() {
        let req = FetchRequest::new("x");
        let out = extract(br#"{"k":"x"}"#, &req, "vault_field", false).unwrap();
        assert_eq!(out, b"x");
    }

    #[test]
    fn json_object_with_no_string_values_errors() {
        let req = FetchRequest::new("x");
        let err = extract(br#"{"k":42}"#, &req, "vault_field", false).unwrap_err();
        assert!(matches!(err, ExtractError::NoSuitableValue));
    }

    #[test]
    fn field_override_selects_named_field() {
        let req = FetchRequest::new("x").with_label("vault_field", "password");
        let out = extract(br#"{"password":"p1","user":"u"}"#, &req, "vault_field", false).unwrap();
        assert_eq!(out, b"p1");
    }

    #[test]
    fn field_override_missing_field_errors_with_available_keys() {
        let req = FetchRequest::new("x").with_label("vault_field", "password");
        let err = extract(br#"{"user":"u"}"#, &req, "vault_field", false).unwrap_err();
        match err {
            ExtractError::FieldNotFound { field, available } => {
                assert_eq!(field, "password");
                assert_eq!(available, vec!["user".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn field_override_value_on_non_json_returns_verbatim() {
        let req = FetchRequest::new("x").with_label("vault_field", "value");
        let out = extract(b"plain", &req, "vault_field", false).unwrap();
        assert_eq!(out, b"plain");
    }

    #[test]
    fn kv_envelope_is_unwrapped_before_selection() {
        let req = FetchRequest::new("x").with_label("vault_field", "password");
        let payload = br#"{"data":{"password":"p1"},"metadata":{"version":1}}"#;
        let out = extract(payload, &req, "vault_field", true).unwrap();
        assert_eq!(out, b"p1");
    }

    #[test]
    fn kv_envelope_default_selection_walks_priority_order() {
        let req = FetchRequest::new("x");
        let payload = br#"{"data":{"secret":"s1"},"metadata":{"version":1}}"#;
        let out = extract(payload, &req, "vault_field", true).unwrap();
        assert_eq!(out, b"s1");
    }

    #[test]
    fn non_string_default_field_is_coerced_via_default_formatting() {
        let req = FetchRequest::new("x");
        let out = extract(br#"{"value":42}"#, &req, "vault_field", false).unwrap();
        assert_eq!(out, b"42");
    }
}
