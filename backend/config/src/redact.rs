//! Masked settings snapshots for logs and `config show`.

use serde_json::Value;

use crate::schema::AppSettings;

/// Keys whose string values are secrets.
static SENSITIVE_KEYS: &[&str] = &[
    "apiKey",
    "api_key",
    "token",
    "accessToken",
    "secret",
    "password",
];

/// Redact a settings JSON value, masking every sensitive string.
pub fn redact(value: &Value) -> Value {
    redact_recursive(value, "")
}

/// Serialize settings and redact the result.
pub fn redact_settings(settings: &AppSettings) -> Value {
    match serde_json::to_value(settings) {
        Ok(value) => redact(&value),
        Err(_) => Value::Null,
    }
}

fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

fn redact_string(s: &str, key: &str) -> Value {
    if !is_sensitive_key(key) || s.is_empty() {
        return Value::String(s.to_string());
    }
    // Env references are not secrets themselves.
    if s.starts_with("${") && s.ends_with('}') {
        return Value::String(s.to_string());
    }
    let hint: String = s.chars().take(4).collect();
    if s.chars().count() > 8 {
        Value::String(format!("{hint}***"))
    } else {
        Value::String("***".to_string())
    }
}

fn redact_recursive(value: &Value, key: &str) -> Value {
    match value {
        Value::String(s) => redact_string(s, key),
        Value::Array(items) => Value::Array(items.iter().map(|v| redact_recursive(v, key)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), redact_recursive(v, k)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Dotted paths of every value [`redact`] would mask.
pub fn collect_redacted_paths(value: &Value) -> Vec<String> {
    let mut paths = Vec::new();
    collect(value, "", &mut paths);
    paths
}

fn collect(value: &Value, path: &str, out: &mut Vec<String>) {
    if let Value::Object(map) = value {
        for (key, v) in map {
            let child = if path.is_empty() {
                key.clone()
            } else {
                format!("{path}.{key}")
            };
            match v {
                Value::String(s) if is_sensitive_key(key) && !s.is_empty() => out.push(child),
                _ => collect(v, &child, out),
            }
        }
    }
}
