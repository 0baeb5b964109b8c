//! Redaction of key material before log lines leave the process.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

const DENYLIST_KEYS: [&str; 11] = [
    "password",
    "mnemonic",
    "seed",
    "private_key",
    "privkey",
    "secret",
    "token",
    "authorization",
    "cookie",
    "cipher",
    "signature",
];

/// Field names kept in production metadata-only mode.
pub(crate) const PROD_ALLOWED_FIELDS: [&str; 7] = [
    "interaction_id",
    "interaction_type",
    "type_tag",
    "route",
    "port",
    "window_id",
    "tab_id",
];

const MAX_STRING_LEN: usize = 512;

pub(crate) fn sanitize_object(fields: BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    fields
        .into_iter()
        .map(|(k, v)| {
            let clean = sanitize_value(&k, &v);
            (k, clean)
        })
        .collect()
}

/// Redact `value` if `key` (or any nested key) looks sensitive.
pub fn sanitize_value(key: &str, value: &Value) -> Value {
    if is_sensitive_key(key) {
        return Value::String("[REDACTED]".to_string());
    }

    match value {
        Value::String(s) => sanitize_string(s),
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), sanitize_value(k, v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| sanitize_value(key, item))
                .collect::<Vec<_>>(),
        ),
        _ => value.clone(),
    }
}

fn sanitize_string(raw: &str) -> Value {
    if looks_like_sensitive_value(raw) {
        return Value::String("[REDACTED]".to_string());
    }
    if raw.len() > MAX_STRING_LEN {
        return Value::String(format!("[TRUNCATED:{} bytes]", raw.len()));
    }
    Value::String(raw.to_string())
}

fn looks_like_sensitive_value(raw: &str) -> bool {
    // 12 or 24 lowercase words reads like a BIP-39 phrase
    let words: Vec<&str> = raw.split_whitespace().collect();
    if (words.len() == 12 || words.len() == 24)
        && words
            .iter()
            .all(|w| w.chars().all(|c| c.is_ascii_lowercase()))
    {
        return true;
    }
    is_long_hex(raw)
}

/// Whether a field name denotes key material.
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    DENYLIST_KEYS.iter().any(|entry| lower.contains(entry))
}

fn is_long_hex(value: &str) -> bool {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    digits.len() >= 64 && digits.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_sensitive_keys() {
        assert_eq!(
            sanitize_value("password", &json!("hunter2")),
            json!("[REDACTED]")
        );
        assert_eq!(
            sanitize_value("payload", &json!({"mnemonic": "x", "chain_id": "cosmoshub-4"})),
            json!({"mnemonic": "[REDACTED]", "chain_id": "cosmoshub-4"})
        );
    }

    #[test]
    fn redacts_mnemonic_shaped_values() {
        let phrase = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
        assert_eq!(sanitize_value("note", &json!(phrase)), json!("[REDACTED]"));
    }

    #[test]
    fn redacts_raw_private_key_hex() {
        let key = "0x".to_string() + &"ab".repeat(32);
        assert_eq!(sanitize_value("data", &json!(key)), json!("[REDACTED]"));
    }

    #[test]
    fn short_ids_pass_through() {
        assert_eq!(
            sanitize_value("interaction_id", &json!("9f1c2a3b4d5e6f70")),
            json!("9f1c2a3b4d5e6f70")
        );
    }

    #[test]
    fn long_strings_are_truncated() {
        let long = "a b ".repeat(200);
        let out = sanitize_value("blob", &json!(long));
        assert_eq!(out, json!("[TRUNCATED:800 bytes]"));
    }
}
