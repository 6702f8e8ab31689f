// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::MirrorgateConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
///
/// Collects every error rather than failing fast.
pub fn validate_config(config: &MirrorgateConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.gateway.log_level.as_str()) {
        fail(format!(
            "gateway.log_level `{}` must be one of: {}",
            config.gateway.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    let addr = config.gateway.bind_address.trim();
    if addr.is_empty() {
        fail("gateway.bind_address must not be empty".to_string());
    } else {
        let is_valid_ip = addr.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = addr
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            fail(format!(
                "gateway.bind_address `{addr}` is not a valid IP address or hostname"
            ));
        }
    }

    if config.gateway.queue_capacity == 0 {
        fail("gateway.queue_capacity must be at least 1".to_string());
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.retry.max_attempts < 1 {
        fail("retry.max_attempts must be at least 1".to_string());
    }
    if config.retry.base_delay_secs > config.retry.max_delay_secs {
        fail(format!(
            "retry.base_delay_secs ({}) must not exceed retry.max_delay_secs ({})",
            config.retry.base_delay_secs, config.retry.max_delay_secs
        ));
    }
    if config.retry.batch_size < 1 {
        fail("retry.batch_size must be at least 1".to_string());
    }
    if config.retry.sweep_interval_secs < 1 {
        fail("retry.sweep_interval_secs must be at least 1".to_string());
    }

    let template = &config.bridge.mirror_conversation_template;
    if !template.contains("{chat}") {
        fail(format!(
            "bridge.mirror_conversation_template `{template}` must contain `{{chat}}`"
        ));
    }

    let mut seen = HashSet::new();
    for (i, session) in config.bridge.sessions.iter().enumerate() {
        if session.session.trim().is_empty() {
            fail(format!("bridge.sessions[{i}].session must not be empty"));
        } else if !seen.insert(session.session.as_str()) {
            fail(format!(
                "duplicate session `{}` in [[bridge.sessions]]",
                session.session
            ));
        }
    }

    for (key, url) in [
        ("mirror.base_url", &config.mirror.base_url),
        ("device.base_url", &config.device.base_url),
        ("webhook.url", &config.webhook.url),
    ] {
        if let Some(url) = url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            fail(format!("{key} `{url}` must start with http:// or https://"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SessionPolicyConfig;

    fn has_error(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    fn session(name: &str) -> SessionPolicyConfig {
        SessionPolicyConfig {
            session: name.to_string(),
            enabled: None,
            auto_create_chat: None,
            excluded_chats: None,
            import_window_days: None,
            authoritative: None,
        }
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&MirrorgateConfig::default()).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = MirrorgateConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "database_path"));
    }

    #[test]
    fn inverted_backoff_bounds_fail_validation() {
        let mut config = MirrorgateConfig::default();
        config.retry.base_delay_secs = 600;
        config.retry.max_delay_secs = 60;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "base_delay_secs"));
    }

    #[test]
    fn zero_attempts_fail_validation() {
        let mut config = MirrorgateConfig::default();
        config.retry.max_attempts = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "max_attempts"));
    }

    #[test]
    fn duplicate_session_overrides_fail_validation() {
        let mut config = MirrorgateConfig::default();
        config.bridge.sessions = vec![session("S1"), session("S1"), session(" ")];
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "duplicate session `S1`"));
        assert!(has_error(&errors, "sessions[2].session"));
    }

    #[test]
    fn non_http_urls_fail_validation() {
        let mut config = MirrorgateConfig::default();
        config.webhook.url = Some("ftp://hooks.example".to_string());
        config.mirror.base_url = Some("https://helpdesk.example".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(has_error(&errors, "webhook.url"));
    }

    #[test]
    fn unknown_log_level_fails_validation() {
        let mut config = MirrorgateConfig::default();
        config.gateway.log_level = "verbose".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "log_level"));
    }

    #[test]
    fn template_without_chat_placeholder_fails() {
        let mut config = MirrorgateConfig::default();
        config.bridge.mirror_conversation_template = "{session}".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "mirror_conversation_template"));
    }
}
