// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end bridge testing.
//!
//! `TestHarness` wires a [`ReconciliationEngine`] to a temp SQLite store,
//! a [`MockMirror`], a [`MockSession`] and a [`RecordingNotifier`].

use std::sync::Arc;

use mirrorgate_bridge::{ConfigPolicyStore, ReconciliationEngine, RetryPolicy};
use mirrorgate_config::model::{BridgeConfig, StorageConfig};
use mirrorgate_core::{MirrorgateError, StorageAdapter};
use mirrorgate_storage::SqliteStorage;

use crate::mock_mirror::MockMirror;
use crate::mock_session::MockSession;
use crate::recording_notifier::RecordingNotifier;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    bridge: BridgeConfig,
    retry: RetryPolicy,
    mirror: Option<MockMirror>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            bridge: BridgeConfig::default(),
            retry: RetryPolicy::default(),
            mirror: None,
        }
    }

    /// Use a custom bridge policy configuration.
    pub fn with_bridge_config(mut self, bridge: BridgeConfig) -> Self {
        self.bridge = bridge;
        self
    }

    /// Use a custom retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Use a preconfigured mirror mock.
    pub fn with_mirror(mut self, mirror: MockMirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Build the harness over a fresh temp database.
    pub async fn build(self) -> Result<TestHarness, MirrorgateError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| MirrorgateError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");

        let storage = Arc::new(SqliteStorage::new(StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        }));
        storage.initialize().await?;

        let mirror = Arc::new(self.mirror.unwrap_or_default());
        let session = Arc::new(MockSession::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let template = self.bridge.mirror_conversation_template.clone();

        let engine = ReconciliationEngine::new(
            storage.clone(),
            mirror.clone(),
            session.clone(),
            Arc::new(ConfigPolicyStore::new(self.bridge)),
            notifier.clone(),
        )
        .with_retry_policy(self.retry)
        .with_conversation_template(template);

        Ok(TestHarness {
            engine: Arc::new(engine),
            storage,
            mirror,
            session,
            notifier,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete bridge over a temp database.
pub struct TestHarness {
    pub engine: Arc<ReconciliationEngine>,
    pub storage: Arc<SqliteStorage>,
    pub mirror: Arc<MockMirror>,
    pub session: Arc<MockSession>,
    pub notifier: Arc<RecordingNotifier>,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A harness with default policy and retry settings.
    pub async fn new() -> Result<Self, MirrorgateError> {
        Self::builder().build().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::local_text;
    use mirrorgate_bridge::LocalOutcome;

    #[tokio::test]
    async fn harness_mirrors_a_message_end_to_end() {
        let harness = TestHarness::new().await.unwrap();
        let outcome = harness
            .engine
            .handle_local(local_text("S1", "a@remote", "wa-1", "hello"))
            .await
            .unwrap();
        assert!(matches!(outcome, LocalOutcome::Synced { created: true, .. }));
        assert_eq!(harness.mirror.create_count().await, 1);
    }
}
