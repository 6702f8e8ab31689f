// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use mirrorgate_config::model::StorageConfig;
use mirrorgate_core::types::{
    Chat, ChatPatch, DeliveryStatus, Message, MirrorMessageRef, NewMessage, Page, RelationCounts,
    RelationDraft, RelationFailure, SyncRelation, SyncStatus, TimeRange, UpsertOutcome,
};
use mirrorgate_core::{
    AdapterType, ChatStore, HealthStatus, MessageStore, MirrorgateError, PluginAdapter,
    RelationStore, StorageAdapter,
};

use crate::database::Database;
use crate::queries::{chats, messages, relations};

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is opened on the first call to
/// [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until [`initialize`] is called.
    ///
    /// [`initialize`]: StorageAdapter::initialize
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, MirrorgateError> {
        self.db.get().ok_or_else(|| MirrorgateError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, MirrorgateError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MirrorgateError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), MirrorgateError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| MirrorgateError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), MirrorgateError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl ChatStore for SqliteStorage {
    async fn upsert_chat(
        &self,
        session_id: &str,
        address: &str,
        patch: &ChatPatch,
    ) -> Result<Chat, MirrorgateError> {
        chats::upsert_chat(self.db()?, session_id, address, patch).await
    }

    async fn get_chat(
        &self,
        session_id: &str,
        address: &str,
    ) -> Result<Option<Chat>, MirrorgateError> {
        chats::get_chat(self.db()?, session_id, address).await
    }

    async fn get_chat_by_id(&self, id: i64) -> Result<Option<Chat>, MirrorgateError> {
        chats::get_chat_by_id(self.db()?, id).await
    }

    async fn list_chats(
        &self,
        session_id: &str,
        include_archived: bool,
        page: Page,
    ) -> Result<Vec<Chat>, MirrorgateError> {
        chats::list_chats(self.db()?, session_id, include_archived, page).await
    }

    async fn find_chat_by_mirror_conversation(
        &self,
        session_id: &str,
        conversation_id: &str,
    ) -> Result<Option<Chat>, MirrorgateError> {
        chats::find_chat_by_mirror_conversation(self.db()?, session_id, conversation_id).await
    }

    async fn set_unread_count(&self, chat_id: i64, count: i64) -> Result<(), MirrorgateError> {
        chats::set_unread_count(self.db()?, chat_id, count).await
    }

    async fn increment_unread(&self, chat_id: i64) -> Result<(), MirrorgateError> {
        chats::increment_unread(self.db()?, chat_id).await
    }

    async fn touch_last_activity(
        &self,
        chat_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), MirrorgateError> {
        chats::touch_last_activity(self.db()?, chat_id, at).await
    }

    async fn set_archived(&self, chat_id: i64, archived: bool) -> Result<(), MirrorgateError> {
        chats::set_archived(self.db()?, chat_id, archived).await
    }

    async fn set_pinned(&self, chat_id: i64, pinned: bool) -> Result<(), MirrorgateError> {
        chats::set_pinned(self.db()?, chat_id, pinned).await
    }

    async fn set_muted(&self, chat_id: i64, muted: bool) -> Result<(), MirrorgateError> {
        chats::set_muted(self.db()?, chat_id, muted).await
    }

    async fn delete_chat(
        &self,
        session_id: &str,
        address: &str,
    ) -> Result<Option<u64>, MirrorgateError> {
        chats::delete_chat(self.db()?, session_id, address).await
    }
}

#[async_trait]
impl MessageStore for SqliteStorage {
    async fn upsert_message(&self, msg: &NewMessage) -> Result<UpsertOutcome, MirrorgateError> {
        messages::upsert_message(self.db()?, msg).await
    }

    async fn get_message_by_remote_id(
        &self,
        session_id: &str,
        remote_id: &str,
    ) -> Result<Option<Message>, MirrorgateError> {
        messages::get_message_by_remote_id(self.db()?, session_id, remote_id).await
    }

    async fn get_message(&self, id: i64) -> Result<Option<Message>, MirrorgateError> {
        messages::get_message(self.db()?, id).await
    }

    async fn mark_deleted(&self, id: i64) -> Result<bool, MirrorgateError> {
        messages::mark_deleted(self.db()?, id).await
    }

    async fn set_reaction(&self, id: i64, reaction: Option<&str>) -> Result<(), MirrorgateError> {
        messages::set_reaction(self.db()?, id, reaction).await
    }

    async fn update_delivery_status(
        &self,
        id: i64,
        status: DeliveryStatus,
    ) -> Result<(), MirrorgateError> {
        messages::update_delivery_status(self.db()?, id, status).await
    }

    async fn list_by_chat(
        &self,
        chat_id: i64,
        range: TimeRange,
        page: Page,
    ) -> Result<Vec<Message>, MirrorgateError> {
        messages::list_by_chat(self.db()?, chat_id, range, page).await
    }
}

#[async_trait]
impl RelationStore for SqliteStorage {
    async fn find_by_local_message(
        &self,
        local_message_id: i64,
    ) -> Result<Option<SyncRelation>, MirrorgateError> {
        relations::find_by_local_message(self.db()?, local_message_id).await
    }

    async fn find_by_mirror_message(
        &self,
        session_id: &str,
        mirror: &MirrorMessageRef,
    ) -> Result<Option<SyncRelation>, MirrorgateError> {
        relations::find_by_mirror_message(self.db()?, session_id, mirror).await
    }

    async fn find_by_echo_token(
        &self,
        session_id: &str,
        token: &str,
    ) -> Result<Option<SyncRelation>, MirrorgateError> {
        relations::find_by_echo_token(self.db()?, session_id, token).await
    }

    async fn find_by_source_token(
        &self,
        session_id: &str,
        token: &str,
    ) -> Result<Option<SyncRelation>, MirrorgateError> {
        relations::find_by_source_token(self.db()?, session_id, token).await
    }

    async fn get_relation(&self, id: i64) -> Result<Option<SyncRelation>, MirrorgateError> {
        relations::get_relation(self.db()?, id).await
    }

    async fn create_or_update(
        &self,
        draft: &RelationDraft,
    ) -> Result<SyncRelation, MirrorgateError> {
        relations::create_or_update(self.db()?, draft).await
    }

    async fn update_status(
        &self,
        id: i64,
        status: SyncStatus,
        failure: Option<&RelationFailure>,
    ) -> Result<SyncRelation, MirrorgateError> {
        relations::update_status(self.db()?, id, status, failure).await
    }

    async fn list_failed(
        &self,
        session_id: &str,
        limit: u32,
    ) -> Result<Vec<SyncRelation>, MirrorgateError> {
        relations::list_failed(self.db()?, session_id, limit).await
    }

    async fn list_due(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<SyncRelation>, MirrorgateError> {
        relations::list_due(self.db()?, now, stale_before, limit).await
    }

    async fn purge_relation(&self, id: i64) -> Result<bool, MirrorgateError> {
        relations::purge_relation(self.db()?, id).await
    }

    async fn count_by_status(&self, session_id: &str) -> Result<RelationCounts, MirrorgateError> {
        relations::count_by_status(self.db()?, session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn sqlite_storage_implements_plugin_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.version(), semver::Version::new(0, 1, 0));
        assert_eq!(storage.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn initialize_opens_database_at_configured_path() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("init_test.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert!(db_path.exists(), "database file should be created");
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("double_init.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert!(storage.initialize().await.is_err());
    }

    #[tokio::test]
    async fn health_check_fails_when_not_initialized() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("no_init.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        assert!(storage.health_check().await.is_err());
        assert!(storage.get_chat("S1", "a@remote").await.is_err());
    }

    #[tokio::test]
    async fn health_check_and_shutdown_when_initialized() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("health.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
        storage.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn mark_read_resets_unread_through_the_trait() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("mark_read.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));
        storage.initialize().await.unwrap();

        let chat = storage
            .upsert_chat("S1", "a@remote", &ChatPatch::default())
            .await
            .unwrap();
        storage.increment_unread(chat.id).await.unwrap();
        storage.increment_unread(chat.id).await.unwrap();
        storage.mark_read(chat.id).await.unwrap();

        let chat = storage.get_chat("S1", "a@remote").await.unwrap().unwrap();
        assert_eq!(chat.unread_count, 0);
    }
}
