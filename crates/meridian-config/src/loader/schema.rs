//! Schema validation helpers for Meridian JSON5 configuration.
//!
//! serde would silently ignore misspelled keys, so every layer is checked
//! against the known key set and value kinds before it is merged.

use super::SchemaMode;
use crate::ConfigError;
use serde_json::{Map, Value};

/// Expected JSON kind for a config field.
#[derive(Debug, Clone, Copy)]
enum FieldKind {
    Bool,
    Unsigned,
    OptionalUnsigned,
    Number,
    Text,
    OptionalText,
    TextArray,
    OneOf(&'static [&'static str]),
}

const RULE_ACTIONS: &[&str] = &["redact", "strip", "flag"];

const CHAT_FIELDS: &[(&str, FieldKind)] = &[
    ("request_timeout_ms", FieldKind::Unsigned),
    ("max_attempts", FieldKind::Unsigned),
    ("base_backoff_ms", FieldKind::Unsigned),
    ("max_backoff_ms", FieldKind::Unsigned),
    ("allow_fallback", FieldKind::Bool),
    ("max_message_chars", FieldKind::Unsigned),
    ("oversize_action", FieldKind::OneOf(&["reject", "truncate"])),
    ("auto_create_sessions", FieldKind::Bool),
    ("history_window", FieldKind::Unsigned),
];

const RATE_LIMIT_FIELDS: &[(&str, FieldKind)] = &[
    ("enabled", FieldKind::Bool),
    ("max_requests", FieldKind::Unsigned),
    ("window_secs", FieldKind::Unsigned),
];

const SANITIZER_FIELDS: &[(&str, FieldKind)] = &[
    ("marker", FieldKind::Text),
    ("dynamic_execution", FieldKind::OneOf(RULE_ACTIONS)),
    ("pii", FieldKind::OneOf(RULE_ACTIONS)),
    ("encoded", FieldKind::OneOf(RULE_ACTIONS)),
    ("control_characters", FieldKind::OneOf(RULE_ACTIONS)),
    ("redact_patterns", FieldKind::TextArray),
];

const SESSIONS_FIELDS: &[(&str, FieldKind)] = &[
    ("ttl_secs", FieldKind::OptionalUnsigned),
    ("persist", FieldKind::Bool),
    ("path", FieldKind::OptionalText),
];

const RECOMMENDATIONS_FIELDS: &[(&str, FieldKind)] = &[
    ("default_max_recommendations", FieldKind::Unsigned),
    ("max_limit", FieldKind::Unsigned),
    ("max_delta", FieldKind::Number),
    ("history_limit", FieldKind::Unsigned),
    ("preference_boost", FieldKind::Number),
    ("same_item_multiplier", FieldKind::Number),
];

const WEIGHT_FIELDS: &[(&str, FieldKind)] = &[
    ("click", FieldKind::Number),
    ("like", FieldKind::Number),
    ("dislike", FieldKind::Number),
    ("dismiss", FieldKind::Number),
];

const VECTOR_FIELDS: &[(&str, FieldKind)] = &[
    ("max_query_chars", FieldKind::Unsigned),
    ("default_max_results", FieldKind::Unsigned),
    ("embed_timeout_ms", FieldKind::Unsigned),
    ("dimension", FieldKind::OptionalUnsigned),
];

/// Validate a single config layer against the schema.
pub(super) fn validate_layer_schema(
    value: &Value,
    _mode: SchemaMode,
    layer: &str,
) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, "")?;
    let allowed = [
        "$schema",
        "chat",
        "rate_limit",
        "sanitizer",
        "sessions",
        "recommendations",
        "vector",
    ];
    ensure_allowed_keys(map, &allowed, layer, "")?;

    if let Some(value) = map.get("$schema") {
        check_field(value, FieldKind::Text, layer, "$schema")?;
    }
    for (section, fields) in [
        ("chat", CHAT_FIELDS),
        ("rate_limit", RATE_LIMIT_FIELDS),
        ("sanitizer", SANITIZER_FIELDS),
        ("sessions", SESSIONS_FIELDS),
        ("vector", VECTOR_FIELDS),
    ] {
        if let Some(value) = map.get(section) {
            validate_section(value, fields, &[], layer, section)?;
        }
    }
    if let Some(value) = map.get("recommendations") {
        validate_recommendations(value, layer, "recommendations")?;
    }
    Ok(())
}

/// Validate the "recommendations" block, which nests the weight table.
fn validate_recommendations(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    validate_section(value, RECOMMENDATIONS_FIELDS, &["weights"], layer, path)?;
    let map = expect_object(value, layer, path)?;
    if let Some(weights) = map.get("weights") {
        validate_section(weights, WEIGHT_FIELDS, &[], layer, &join_path(path, "weights"))?;
    }
    Ok(())
}

/// Validate a flat section: known keys only, each with the expected kind.
fn validate_section(
    value: &Value,
    fields: &[(&str, FieldKind)],
    nested: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    let allowed: Vec<&str> = fields
        .iter()
        .map(|(name, _)| *name)
        .chain(nested.iter().copied())
        .collect();
    ensure_allowed_keys(map, &allowed, layer, path)?;
    for (name, kind) in fields {
        if let Some(value) = map.get(*name) {
            check_field(value, *kind, layer, &join_path(path, name))?;
        }
    }
    Ok(())
}

/// Check a single value against its expected kind.
fn check_field(value: &Value, kind: FieldKind, layer: &str, path: &str) -> Result<(), ConfigError> {
    let valid = match kind {
        FieldKind::Bool => value.is_boolean(),
        FieldKind::Unsigned => value.is_u64(),
        FieldKind::OptionalUnsigned => value.is_null() || value.is_u64(),
        FieldKind::Number => value.is_number(),
        FieldKind::Text => value.is_string(),
        FieldKind::OptionalText => value.is_null() || value.is_string(),
        FieldKind::TextArray => return validate_string_array(value, layer, path),
        FieldKind::OneOf(options) => {
            return match value.as_str() {
                Some(found) if options.contains(&found) => Ok(()),
                _ => Err(invalid_field(
                    layer,
                    path,
                    &format!("expected one of: {}", options.join(", ")),
                )),
            };
        }
    };
    if valid {
        Ok(())
    } else {
        Err(invalid_field(layer, path, expected_label(kind)))
    }
}

fn expected_label(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Bool => "expected bool",
        FieldKind::Unsigned => "expected non-negative integer",
        FieldKind::OptionalUnsigned => "expected non-negative integer or null",
        FieldKind::Number => "expected number",
        FieldKind::Text => "expected string",
        FieldKind::OptionalText => "expected string or null",
        FieldKind::TextArray => "expected array of strings",
        FieldKind::OneOf(_) => "expected enum value",
    }
}

/// Expect a JSON object or return a typed error.
fn expect_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(invalid_field(layer, path, "expected object")),
    }
}

/// Validate that a value is an array of strings.
fn validate_string_array(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let Value::Array(entries) = value else {
        return Err(invalid_field(layer, path, "expected array"));
    };
    for (idx, entry) in entries.iter().enumerate() {
        if entry.as_str().is_none() {
            return Err(invalid_field(
                layer,
                &format!("{path}[{idx}]"),
                "expected string",
            ));
        }
    }
    Ok(())
}

/// Ensure an object contains only allowed keys.
fn ensure_allowed_keys(
    map: &Map<String, Value>,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    for key in map.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(invalid_field(layer, &join_path(path, key), "unknown key"));
        }
    }
    Ok(())
}

/// Join nested paths for better error messages.
fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Build a structured invalid-field error.
fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    let normalized_path = if path.is_empty() { "root" } else { path };
    ConfigError::InvalidField {
        path: format!("{layer}:{normalized_path}"),
        message: message.to_string(),
    }
}
