//! Tests for layered configuration loading.

use super::*;
use crate::{OversizeAction, RuleActionConfig};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Write JSON5 contents to a path, creating parent directories if needed.
fn write_json5(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("dir");
    }
    fs::write(path, contents).expect("write");
}

/// Verify that a minimal config parses with defaults.
#[test]
fn parse_minimal_config() {
    let config = MeridianConfig::load_from_str("{}").expect("config");
    assert_eq!(config, MeridianConfig::default());
    assert_eq!(config.chat.max_attempts, 3);
    assert_eq!(config.chat.request_timeout_ms, 2_000);
    assert_eq!(config.chat.max_message_chars, 4_000);
    assert_eq!(config.rate_limit.max_requests, 20);
    assert_eq!(config.rate_limit.window_secs, 3_600);
    assert_eq!(config.sanitizer.marker, "[FILTERED]");
    assert_eq!(config.recommendations.default_max_recommendations, 5);
    assert_eq!(config.vector.max_query_chars, 1_000);
}

/// JSON5 comments, trailing commas and partial sections are accepted.
#[test]
fn parse_partial_sections_with_json5_syntax() {
    let json5 = r#"{
        // tighten the limiter for tests
        rate_limit: { max_requests: 2, window_secs: 10, },
        chat: { oversize_action: "truncate", allow_fallback: true },
        sanitizer: { pii: "redact", redact_patterns: ["internal-\\d+"] },
        sessions: { ttl_secs: null },
    }"#;
    let config = MeridianConfig::load_from_str(json5).expect("config");
    assert_eq!(config.rate_limit.max_requests, 2);
    assert_eq!(config.rate_limit.window_secs, 10);
    assert!(config.rate_limit.enabled);
    assert_eq!(config.chat.oversize_action, OversizeAction::Truncate);
    assert!(config.chat.allow_fallback);
    assert_eq!(config.chat.max_attempts, 3);
    assert_eq!(config.sanitizer.pii, RuleActionConfig::Redact);
    assert_eq!(config.sanitizer.redact_patterns, vec!["internal-\\d+"]);
    assert_eq!(config.sessions.ttl_secs, None);
}

/// Reject unexpected top-level config keys.
#[test]
fn rejects_unknown_top_level_key() {
    let err = MeridianConfig::load_from_str("{ unexpected: true }").unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("unknown key"));
    assert!(msg.contains("config:unexpected"));
}

/// Reject unknown keys nested inside a section.
#[test]
fn rejects_unknown_nested_key() {
    let json5 = r#"{ recommendations: { weights: { share: 0.2 } } }"#;
    let err = MeridianConfig::load_from_str(json5).unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("recommendations.weights.share"));
}

/// Reject invalid enum values.
#[test]
fn rejects_invalid_oversize_action() {
    let json5 = r#"{ chat: { oversize_action: "drop" } }"#;
    let err = MeridianConfig::load_from_str(json5).unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("chat.oversize_action"));
    assert!(msg.contains("reject, truncate"));
}

/// Reject values with the wrong JSON type.
#[test]
fn rejects_wrong_value_kind() {
    let err = MeridianConfig::load_from_str(r#"{ rate_limit: { max_requests: -1 } }"#)
        .unwrap_err();
    assert!(format!("{err}").contains("rate_limit.max_requests"));

    let err = MeridianConfig::load_from_str(r#"{ sanitizer: { redact_patterns: [1] } }"#)
        .unwrap_err();
    assert!(format!("{err}").contains("sanitizer.redact_patterns[0]"));
}

/// Cross-field validation rejects unusable values.
#[test]
fn rejects_invalid_cross_field_values() {
    let err = MeridianConfig::load_from_str("{ chat: { max_attempts: 0 } }").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));

    let json5 = "{ recommendations: { default_max_recommendations: 30, max_limit: 20 } }";
    let err = MeridianConfig::load_from_str(json5).unwrap_err();
    assert!(format!("{err}").contains("default_max_recommendations"));

    let err = MeridianConfig::load_from_str("{ vector: { dimension: 0 } }").unwrap_err();
    assert!(format!("{err}").contains("vector.dimension"));
}

/// A disabled limiter may carry zero limits.
#[test]
fn disabled_rate_limit_skips_limit_validation() {
    let json5 = "{ rate_limit: { enabled: false, max_requests: 0 } }";
    let config = MeridianConfig::load_from_str(json5).expect("config");
    assert!(!config.rate_limit.enabled);
}

/// Ensure later layers win: user < project < cwd < runtime.
#[test]
fn layered_config_applies_precedence() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();
    let project_root = root.join("project");
    fs::create_dir_all(project_root.join(".git")).expect("git");
    let cwd = project_root.join("subdir");
    fs::create_dir_all(&cwd).expect("cwd");

    let user_config = root.join("user.json5");
    write_json5(
        &user_config,
        "{ sanitizer: { marker: \"user\" }, rate_limit: { max_requests: 5 } }",
    );
    write_json5(
        &project_root.join(DEFAULT_CONFIG_FILE),
        "{ sanitizer: { marker: \"project\" }, chat: { max_attempts: 4 } }",
    );
    write_json5(
        &cwd.join(DEFAULT_CONFIG_FILE),
        "{ sanitizer: { marker: \"cwd\" } }",
    );
    let runtime_config = root.join("runtime.json5");
    write_json5(&runtime_config, "{ sanitizer: { marker: \"runtime\" } }");

    let options = LayeredConfigOptions::new(&cwd)
        .with_user_path(Some(user_config.clone()))
        .with_runtime_path(&runtime_config);
    let layered = MeridianConfig::load_layered_with_options(options).expect("layered");

    assert_eq!(layered.config.sanitizer.marker, "runtime");
    assert_eq!(layered.config.rate_limit.max_requests, 5);
    assert_eq!(layered.config.chat.max_attempts, 4);
    let sources: Vec<ConfigLayerSource> =
        layered.layers.iter().map(|layer| layer.source).collect();
    assert_eq!(
        sources,
        vec![
            ConfigLayerSource::User,
            ConfigLayerSource::Project,
            ConfigLayerSource::Cwd,
            ConfigLayerSource::Runtime,
        ]
    );
}

/// The project layer is skipped when it resolves to the cwd layer.
#[test]
fn layered_config_dedupes_project_and_cwd() {
    let temp = TempDir::new().expect("tmp");
    let project_root = temp.path().join("project");
    fs::create_dir_all(project_root.join(".git")).expect("git");
    write_json5(
        &project_root.join(DEFAULT_CONFIG_FILE),
        "{ vector: { default_max_results: 3 } }",
    );

    let options = LayeredConfigOptions::new(&project_root).with_user_path(None);
    let layered = MeridianConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.layers.len(), 1);
    assert_eq!(layered.layers[0].source, ConfigLayerSource::Project);
    assert_eq!(layered.config.vector.default_max_results, 3);
}

/// Missing optional layers fall back to defaults.
#[test]
fn layered_config_without_files_uses_defaults() {
    let temp = TempDir::new().expect("tmp");
    let options = LayeredConfigOptions::new(temp.path()).with_user_path(None);
    let layered = MeridianConfig::load_layered_with_options(options).expect("layered");
    assert!(layered.layers.is_empty());
    assert_eq!(layered.config, MeridianConfig::default());
}

/// A missing runtime override is an error rather than a silent skip.
#[test]
fn layered_config_requires_runtime_paths() {
    let temp = TempDir::new().expect("tmp");
    let options = LayeredConfigOptions::new(temp.path())
        .with_user_path(None)
        .with_runtime_path(temp.path().join("missing.json5"));
    let err = MeridianConfig::load_layered_with_options(options).unwrap_err();
    assert!(matches!(err, ConfigError::ReadFailed(_)));
}

/// Invalid keys in a layer name the offending layer.
#[test]
fn layered_config_reports_layer_label() {
    let temp = TempDir::new().expect("tmp");
    write_json5(&temp.path().join(DEFAULT_CONFIG_FILE), "{ chat: { retries: 2 } }");
    let options = LayeredConfigOptions::new(temp.path()).with_user_path(None);
    let err = MeridianConfig::load_layered_with_options(options).unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("cwd("));
    assert!(msg.contains("chat.retries"));
}

/// Builder overrides individual sections.
#[test]
fn builder_replaces_sections() {
    let config = MeridianConfig::builder()
        .rate_limit(crate::RateLimitConfig {
            enabled: false,
            ..Default::default()
        })
        .build();
    assert!(!config.rate_limit.enabled);
    assert_eq!(config.chat, crate::ChatConfig::default());
}
