// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage traits for the Message Store, Chat Aggregate and Relation Store.
//!
//! Every method is a single atomic unit: either the whole write commits or
//! none of it does. Dropping a returned future before completion therefore
//! leaves the last committed state in place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::MirrorgateError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Chat, ChatPatch, DeliveryStatus, Message, MirrorMessageRef, NewMessage, Page, RelationCounts,
    RelationDraft, RelationFailure, SyncRelation, SyncStatus, TimeRange, UpsertOutcome,
};

/// Per-conversation aggregate.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Create-or-merge keyed on `(session_id, address)`. Only attributes set
    /// in `patch` overwrite stored values.
    async fn upsert_chat(
        &self,
        session_id: &str,
        address: &str,
        patch: &ChatPatch,
    ) -> Result<Chat, MirrorgateError>;

    async fn get_chat(&self, session_id: &str, address: &str)
        -> Result<Option<Chat>, MirrorgateError>;

    async fn get_chat_by_id(&self, id: i64) -> Result<Option<Chat>, MirrorgateError>;

    /// Newest activity first; archived chats only when `include_archived`.
    async fn list_chats(
        &self,
        session_id: &str,
        include_archived: bool,
        page: Page,
    ) -> Result<Vec<Chat>, MirrorgateError>;

    /// Finds the chat whose messages are mirrored into `conversation_id`.
    async fn find_chat_by_mirror_conversation(
        &self,
        session_id: &str,
        conversation_id: &str,
    ) -> Result<Option<Chat>, MirrorgateError>;

    async fn set_unread_count(&self, chat_id: i64, count: i64) -> Result<(), MirrorgateError>;

    async fn increment_unread(&self, chat_id: i64) -> Result<(), MirrorgateError>;

    /// Resets the unread counter to zero.
    async fn mark_read(&self, chat_id: i64) -> Result<(), MirrorgateError> {
        self.set_unread_count(chat_id, 0).await
    }

    /// Moves last-activity forward to `at`; never backwards.
    async fn touch_last_activity(
        &self,
        chat_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), MirrorgateError>;

    async fn set_archived(&self, chat_id: i64, archived: bool) -> Result<(), MirrorgateError>;

    async fn set_pinned(&self, chat_id: i64, pinned: bool) -> Result<(), MirrorgateError>;

    async fn set_muted(&self, chat_id: i64, muted: bool) -> Result<(), MirrorgateError>;

    /// Hard-deletes the chat together with its messages and their relations.
    /// Returns the number of relations removed, or `None` if no chat matched.
    async fn delete_chat(
        &self,
        session_id: &str,
        address: &str,
    ) -> Result<Option<u64>, MirrorgateError>;
}

/// Durable record of messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Inserts when `(session_id, remote_id)` is absent, otherwise merges the
    /// mutable fields. Maintains the owning chat's activity and unread count.
    async fn upsert_message(&self, msg: &NewMessage) -> Result<UpsertOutcome, MirrorgateError>;

    async fn get_message_by_remote_id(
        &self,
        session_id: &str,
        remote_id: &str,
    ) -> Result<Option<Message>, MirrorgateError>;

    async fn get_message(&self, id: i64) -> Result<Option<Message>, MirrorgateError>;

    /// Soft-deletes. Returns false when the message was already deleted.
    async fn mark_deleted(&self, id: i64) -> Result<bool, MirrorgateError>;

    async fn set_reaction(&self, id: i64, reaction: Option<&str>) -> Result<(), MirrorgateError>;

    async fn update_delivery_status(
        &self,
        id: i64,
        status: DeliveryStatus,
    ) -> Result<(), MirrorgateError>;

    /// Newest first, soft-deleted rows excluded.
    async fn list_by_chat(
        &self,
        chat_id: i64,
        range: TimeRange,
        page: Page,
    ) -> Result<Vec<Message>, MirrorgateError>;
}

/// Mapping between local messages and mirror-system messages.
#[async_trait]
pub trait RelationStore: Send + Sync {
    async fn find_by_local_message(
        &self,
        local_message_id: i64,
    ) -> Result<Option<SyncRelation>, MirrorgateError>;

    async fn find_by_mirror_message(
        &self,
        session_id: &str,
        mirror: &MirrorMessageRef,
    ) -> Result<Option<SyncRelation>, MirrorgateError>;

    async fn find_by_echo_token(
        &self,
        session_id: &str,
        token: &str,
    ) -> Result<Option<SyncRelation>, MirrorgateError>;

    async fn find_by_source_token(
        &self,
        session_id: &str,
        token: &str,
    ) -> Result<Option<SyncRelation>, MirrorgateError>;

    async fn get_relation(&self, id: i64) -> Result<Option<SyncRelation>, MirrorgateError>;

    /// Atomic per natural key: concurrent calls for the same key serialize
    /// and the later write wins. Never produces a second row for a key.
    async fn create_or_update(&self, draft: &RelationDraft)
        -> Result<SyncRelation, MirrorgateError>;

    /// Narrow status transition used by the engine and the retry path.
    async fn update_status(
        &self,
        id: i64,
        status: SyncStatus,
        failure: Option<&RelationFailure>,
    ) -> Result<SyncRelation, MirrorgateError>;

    /// Failed relations for operator review, oldest first.
    async fn list_failed(
        &self,
        session_id: &str,
        limit: u32,
    ) -> Result<Vec<SyncRelation>, MirrorgateError>;

    /// Relations the retry sweep should pick up now: transient failures whose
    /// backoff has elapsed, plus pending relations untouched since `stale_before`.
    async fn list_due(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<SyncRelation>, MirrorgateError>;

    /// Administrative purge. Returns false when no row matched.
    async fn purge_relation(&self, id: i64) -> Result<bool, MirrorgateError>;

    async fn count_by_status(&self, session_id: &str) -> Result<RelationCounts, MirrorgateError>;
}

/// A full persistence backend.
#[async_trait]
pub trait StorageAdapter: PluginAdapter + ChatStore + MessageStore + RelationStore {
    /// Opens the backend and runs migrations.
    async fn initialize(&self) -> Result<(), MirrorgateError>;

    /// Flushes pending writes and releases connections.
    async fn close(&self) -> Result<(), MirrorgateError>;
}
