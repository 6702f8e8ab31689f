// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Mirrorgate bridge.
//!
//! Provides the error type, the session-scoped domain types (chats,
//! messages, sync relations, bridge policy) and the adapter traits that
//! storage backends, mirror clients, and session layers implement.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{FailureKind, MirrorgateError};
pub use types::{AdapterType, HealthStatus};

pub use traits::{
    ChatStore, MessageStore, MirrorClient, Notifier, PluginAdapter, PolicyStore, RelationStore,
    SessionSender, StorageAdapter,
};
pub use traits::notifier::NoopNotifier;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_storage_adapter<T: StorageAdapter>() {}
        fn _assert_mirror_client<T: MirrorClient>() {}
        fn _assert_session_sender<T: SessionSender>() {}
        fn _assert_notifier<T: Notifier>() {}
        fn _assert_policy_store<T: PolicyStore>() {}
        _assert_notifier::<NoopNotifier>();
    }

    #[test]
    fn adapter_type_round_trips_through_strings() {
        use std::str::FromStr;

        for variant in [
            AdapterType::Storage,
            AdapterType::Mirror,
            AdapterType::Session,
            AdapterType::Notifier,
        ] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn health_status_variants() {
        assert_eq!(HealthStatus::Healthy, HealthStatus::Healthy);
        assert_ne!(HealthStatus::Degraded("slow".into()), HealthStatus::Healthy);
    }
}
