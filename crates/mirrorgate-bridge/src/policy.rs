// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bridge policy backed by the `[bridge]` configuration section.

use async_trait::async_trait;
use mirrorgate_config::model::BridgeConfig;
use mirrorgate_core::types::BridgePolicy;
use mirrorgate_core::{MirrorgateError, PolicyStore};

/// Resolves per-session policy from static configuration.
#[derive(Debug, Clone)]
pub struct ConfigPolicyStore {
    config: BridgeConfig,
}

impl ConfigPolicyStore {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PolicyStore for ConfigPolicyStore {
    async fn policy(&self, session_id: &str) -> Result<BridgePolicy, MirrorgateError> {
        Ok(self.config.policy_for(session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrorgate_config::model::SessionPolicyConfig;
    use mirrorgate_core::types::Authority;

    #[tokio::test]
    async fn session_override_inherits_unset_fields() {
        let config = BridgeConfig {
            excluded_chats: vec!["status@broadcast".into()],
            import_window_days: 3,
            sessions: vec![SessionPolicyConfig {
                session: "S2".into(),
                enabled: Some(false),
                auto_create_chat: None,
                excluded_chats: None,
                import_window_days: None,
                authoritative: Some(Authority::Mirror),
            }],
            ..BridgeConfig::default()
        };
        let store = ConfigPolicyStore::new(config);

        let s1 = store.policy("S1").await.unwrap();
        assert!(s1.enabled);
        assert_eq!(s1.authoritative, Authority::Platform);

        let s2 = store.policy("S2").await.unwrap();
        assert!(!s2.enabled);
        assert_eq!(s2.authoritative, Authority::Mirror);
        assert_eq!(s2.import_window_days, 3);
        assert!(s2.is_excluded("status@broadcast"));
    }
}
