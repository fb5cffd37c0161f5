//! TOON response encoding.
//!
//! Tool payloads are a mapping from batch key to outcome record, encoded as
//! TOON text. Key order is insertion order (serde_json's `preserve_order`
//! feature), so the same batch always produces the same text.

use serde::Serialize;
use serde_json::Value;

/// Encode a value as TOON. If encoding fails, fall back to a compact JSON
/// error object so the caller always receives parseable text.
pub(crate) fn encode_value(value: &Value) -> String {
    match toon_format::encode_default(value) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "toon encoding failed, falling back to json");
            let fallback = serde_json::json!({
                "status": "error",
                "error": format!("response encoding failed: {e}"),
            });
            serde_json::to_string(&fallback).unwrap_or_else(|_| {
                "status: error\nerror: response encoding failed".to_string()
            })
        }
    }
}

/// Encode an ordered batch of `(key, record)` entries as one TOON mapping.
pub(crate) fn encode_entries<T: Serialize>(entries: &[(String, T)]) -> String {
    let mut map = serde_json::Map::new();
    for (key, record) in entries {
        let value = serde_json::to_value(record).unwrap_or_else(|e| {
            serde_json::json!({
                "status": "error",
                "error": format!("serialization failed: {e}"),
            })
        });
        map.insert(key.clone(), value);
    }
    encode_value(&Value::Object(map))
}
