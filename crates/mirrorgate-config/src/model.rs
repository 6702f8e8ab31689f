// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Mirrorgate bridge.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use mirrorgate_core::types::{Authority, BridgePolicy};
use serde::{Deserialize, Serialize};

/// Top-level Mirrorgate configuration.
///
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MirrorgateConfig {
    /// Process identity, logging, and HTTP listener settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Default bridge policy plus per-session overrides.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Retry sweep settings for failed relations.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Mirror-system API settings.
    #[serde(default)]
    pub mirror: MirrorConfig,

    /// Session/device layer send endpoint.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Outbound webhook notifications.
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// Process identity, logging, and HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Instance name, used in logs and the health endpoint.
    #[serde(default = "default_gateway_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Address to bind the HTTP listener to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port to bind the HTTP listener to.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token required on `/v1/*` routes. `None` disables auth.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Capacity of each per-session event queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            name: default_gateway_name(),
            log_level: default_log_level(),
            bind_address: default_bind_address(),
            port: default_port(),
            bearer_token: None,
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_gateway_name() -> String {
    "mirrorgate".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8088
}

fn default_queue_capacity() -> usize {
    256
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("mirrorgate").join("mirrorgate.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("mirrorgate.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Default bridge policy applied to every session without an override.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Whether messages are mirrored at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Create a local chat when the mirror replies into an unknown conversation.
    #[serde(default = "default_true")]
    pub auto_create_chat: bool,

    /// Chat addresses that are never mirrored.
    #[serde(default)]
    pub excluded_chats: Vec<String>,

    /// How many days of history are mirrored on import. 0 disables import.
    #[serde(default)]
    pub import_window_days: u32,

    /// Which side wins on edits.
    #[serde(default)]
    pub authoritative: Authority,

    /// Template for the mirror conversation reference. Supports `{session}` and `{chat}`.
    #[serde(default = "default_conversation_template")]
    pub mirror_conversation_template: String,

    /// Per-session overrides.
    #[serde(default)]
    pub sessions: Vec<SessionPolicyConfig>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_create_chat: true,
            excluded_chats: Vec::new(),
            import_window_days: 0,
            authoritative: Authority::default(),
            mirror_conversation_template: default_conversation_template(),
            sessions: Vec::new(),
        }
    }
}

impl BridgeConfig {
    /// The policy in effect for `session_id` after applying any override.
    pub fn policy_for(&self, session_id: &str) -> BridgePolicy {
        let base = BridgePolicy {
            enabled: self.enabled,
            excluded_chats: self.excluded_chats.clone(),
            auto_create_chat: self.auto_create_chat,
            import_window_days: self.import_window_days,
            authoritative: self.authoritative,
        };
        match self.sessions.iter().find(|s| s.session == session_id) {
            Some(over) => BridgePolicy {
                enabled: over.enabled.unwrap_or(base.enabled),
                excluded_chats: over.excluded_chats.clone().unwrap_or(base.excluded_chats),
                auto_create_chat: over.auto_create_chat.unwrap_or(base.auto_create_chat),
                import_window_days: over.import_window_days.unwrap_or(base.import_window_days),
                authoritative: over.authoritative.unwrap_or(base.authoritative),
            },
            None => base,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_conversation_template() -> String {
    "{session}:{chat}".to_string()
}

/// Bridge settings for a single session. Unset fields inherit from `[bridge]`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionPolicyConfig {
    /// Session identifier this override applies to.
    pub session: String,

    #[serde(default)]
    pub enabled: Option<bool>,

    #[serde(default)]
    pub auto_create_chat: Option<bool>,

    #[serde(default)]
    pub excluded_chats: Option<Vec<String>>,

    #[serde(default)]
    pub import_window_days: Option<u32>,

    #[serde(default)]
    pub authoritative: Option<Authority>,
}

/// Retry sweep configuration for failed relations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Attempts (including the first) before a relation is left for an operator.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff after the first failure.
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,

    /// Upper bound on the backoff.
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,

    /// How often the sweep runs.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Relations loaded per sweep.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Pending relations untouched this long are treated as abandoned attempts.
    #[serde(default = "default_stale_pending_secs")]
    pub stale_pending_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            batch_size: default_batch_size(),
            stale_pending_secs: default_stale_pending_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_secs() -> u64 {
    30
}

fn default_max_delay_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_batch_size() -> u32 {
    50
}

fn default_stale_pending_secs() -> u64 {
    600
}

/// Mirror-system API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MirrorConfig {
    /// Base URL of the mirror API. `None` leaves mirroring unconfigured.
    #[serde(default)]
    pub base_url: Option<String>,

    /// API token sent as a bearer credential.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Request timeout.
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_token: None,
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

/// Session/device layer send endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Base URL of the device gateway. `None` disables relaying mirror replies.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_token: None,
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

fn default_http_timeout_secs() -> u64 {
    15
}

/// Outbound webhook notification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Destination URL. `None` disables webhooks.
    #[serde(default)]
    pub url: Option<String>,

    /// HMAC-SHA256 signing key. Unsigned when `None`.
    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            secret: None,
            timeout_secs: default_webhook_timeout_secs(),
        }
    }
}

fn default_webhook_timeout_secs() -> u64 {
    10
}
