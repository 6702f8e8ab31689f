// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Mirrorgate configuration system.

use mirrorgate_config::diagnostic::{suggest_key, ConfigError};
use mirrorgate_config::model::MirrorgateConfig;
use mirrorgate_config::{load_and_validate_str, load_config_from_str};
use mirrorgate_core::types::Authority;

/// Valid TOML with all known sections deserializes successfully.
#[test]
fn valid_toml_deserializes_into_mirrorgate_config() {
    let toml = r#"
[gateway]
name = "edge-1"
log_level = "debug"
bind_address = "0.0.0.0"
port = 9000
bearer_token = "s3cret"

[storage]
database_path = "/tmp/mirrorgate-test.db"
wal_mode = false

[bridge]
excluded_chats = ["status@broadcast"]
import_window_days = 7
authoritative = "mirror"

[[bridge.sessions]]
session = "S1"
enabled = false

[retry]
max_attempts = 3
base_delay_secs = 5
max_delay_secs = 60

[mirror]
base_url = "https://helpdesk.example"
api_token = "tok"

[webhook]
url = "https://hooks.example/in"
secret = "whsec"
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.gateway.name, "edge-1");
    assert_eq!(config.gateway.port, 9000);
    assert_eq!(config.gateway.bearer_token.as_deref(), Some("s3cret"));
    assert_eq!(config.storage.database_path, "/tmp/mirrorgate-test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.bridge.import_window_days, 7);
    assert_eq!(config.bridge.authoritative, Authority::Mirror);
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.mirror.base_url.as_deref(), Some("https://helpdesk.example"));
    assert_eq!(config.webhook.secret.as_deref(), Some("whsec"));

    let s1 = config.bridge.policy_for("S1");
    assert!(!s1.enabled);
    assert_eq!(s1.excluded_chats, vec!["status@broadcast".to_string()]);
    assert!(config.bridge.policy_for("S9").enabled);
}

/// Unknown field in [retry] produces an UnknownField error.
#[test]
fn unknown_field_in_retry_produces_error() {
    let toml = r#"
[retry]
max_atempts = 3
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("max_atempts"),
        "error should mention unknown field or the bad key, got: {err_str}"
    );
}

/// Missing sections fall back to defaults.
#[test]
fn missing_optional_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");
    assert_eq!(config.gateway.name, "mirrorgate");
    assert_eq!(config.gateway.log_level, "info");
    assert!(config.bridge.enabled);
    assert!(config.bridge.auto_create_chat);
    assert_eq!(config.bridge.mirror_conversation_template, "{session}:{chat}");
    assert_eq!(config.retry.max_attempts, 5);
    assert!(config.mirror.base_url.is_none());
    assert!(config.webhook.url.is_none());
}

/// Unknown top-level section is rejected.
#[test]
fn deny_unknown_fields_at_top_level() {
    let toml = r#"
[agent]
name = "x"
"#;

    assert!(load_config_from_str(toml).is_err());
}

/// Serialized defaults round-trip through TOML.
#[test]
fn serialized_defaults_are_sensible() {
    let defaults = MirrorgateConfig::default();
    let rendered = toml::to_string(&defaults).expect("defaults serialize");
    let parsed = load_config_from_str(&rendered).expect("defaults parse back");
    assert_eq!(parsed.retry.base_delay_secs, defaults.retry.base_delay_secs);
    assert_eq!(parsed.gateway.port, defaults.gateway.port);
}

#[test]
fn diagnostic_api_tken_suggests_api_token() {
    let suggestion = suggest_key("api_tken", &["base_url", "api_token", "timeout_secs"]);
    assert_eq!(suggestion.as_deref(), Some("api_token"));
}

/// Errors from load_and_validate_str carry the key, a suggestion, and valid keys.
#[test]
fn diagnostic_error_includes_unknown_key() {
    let toml = r#"
[mirror]
api_tken = "tok"
"#;

    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    let has_unknown_key = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, section, suggestion, valid_keys, .. } if {
            key == "api_tken"
                && section == "[mirror]"
                && suggestion.as_deref() == Some("api_token")
                && valid_keys.contains("base_url")
        })
    });
    assert!(
        has_unknown_key,
        "should have UnknownKey error for 'api_tken' with suggestion 'api_token', got: {errors:?}"
    );
}

/// Invalid type (string where number expected) produces a clear message.
#[test]
fn diagnostic_invalid_type_message() {
    let toml = r#"
[gateway]
port = "eighty"
"#;

    let err = load_config_from_str(toml).expect_err("should reject invalid type");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("invalid type") || err_str.contains("port"),
        "error should mention type mismatch, got: {err_str}"
    );
}

#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "api_tken".to_string(),
        section: "[mirror]".to_string(),
        suggestion: Some("api_token".to_string()),
        valid_keys: "base_url, api_token, timeout_secs".to_string(),
        span: None,
        src: None,
    };

    assert!(error.code().is_some());
    let help = error.help().map(|h| h.to_string()).unwrap_or_default();
    assert!(help.contains("did you mean `api_token`"), "got: {help}");

    let mut buf = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut buf, &error)
        .expect("should render without error");
    assert!(buf.contains("api_tken"));
}

#[test]
fn session_override_typo_points_at_the_override() {
    let toml = r#"
[bridge]
enabled = true

[[bridge.sessions]]
session = "S1"
import_window_dayz = 3
"#;

    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    let found = errors.iter().find_map(|e| match e {
        ConfigError::UnknownKey {
            key,
            section,
            suggestion,
            span,
            ..
        } if key == "import_window_dayz" => Some((section.clone(), suggestion.clone(), *span)),
        _ => None,
    });
    let (section, suggestion, span) = found.expect("unknown key reported");
    assert_eq!(section, "[[bridge.sessions]]");
    assert_eq!(suggestion.as_deref(), Some("import_window_days"));
    let span = span.expect("span located");
    assert_eq!(&toml[span.offset()..span.offset() + span.len()], "import_window_dayz");
}

#[test]
fn retry_typo_renders_with_section_help() {
    use miette::Diagnostic;

    let toml = r#"
[retry]
max_atempts = 3
"#;

    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    let help = errors
        .iter()
        .find(|e| matches!(e, ConfigError::UnknownKey { .. }))
        .and_then(|e| e.help().map(|h| h.to_string()))
        .expect("unknown key with help");
    assert!(help.contains("did you mean `max_attempts`?"), "got: {help}");
    assert!(help.contains("[retry] accepts:"), "got: {help}");
}

/// Semantic validation runs after a successful parse and reports every problem.
#[test]
fn validation_collects_all_errors() {
    let toml = r#"
[storage]
database_path = ""

[retry]
max_attempts = 0
base_delay_secs = 100
max_delay_secs = 10

[[bridge.sessions]]
session = "S1"

[[bridge.sessions]]
session = "S1"
"#;

    let errors = load_and_validate_str(toml).expect_err("invalid config should fail");
    let messages: Vec<String> = errors
        .iter()
        .filter_map(|e| match e {
            ConfigError::Validation { message } => Some(message.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(messages.len(), 4, "got: {messages:?}");
    assert!(messages.iter().any(|m| m.contains("database_path")));
    assert!(messages.iter().any(|m| m.contains("max_attempts")));
    assert!(messages.iter().any(|m| m.contains("base_delay_secs")));
    assert!(messages.iter().any(|m| m.contains("duplicate session")));
}

#[test]
fn load_and_validate_valid_toml() {
    let toml = r#"
[gateway]
name = "edge"
"#;

    let config = load_and_validate_str(toml).expect("valid TOML should validate");
    assert_eq!(config.gateway.name, "edge");
}
