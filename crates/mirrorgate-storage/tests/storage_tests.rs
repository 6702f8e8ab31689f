// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the SQLite storage adapter.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use mirrorgate_config::model::StorageConfig;
use mirrorgate_core::types::{
    ChatPatch, DeliveryStatus, Direction, MessageContent, MirrorMessageRef, NewMessage,
    RelationDraft, SyncStatus,
};
use mirrorgate_core::{ChatStore, MessageStore, RelationStore, StorageAdapter};
use mirrorgate_storage::SqliteStorage;
use tempfile::TempDir;

async fn storage() -> (Arc<SqliteStorage>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("integration.db");
    let storage = SqliteStorage::new(StorageConfig {
        database_path: path.to_string_lossy().into_owned(),
        wal_mode: true,
    });
    storage.initialize().await.unwrap();
    (Arc::new(storage), dir)
}

fn message(session: &str, chat: &str, remote_id: &str) -> NewMessage {
    NewMessage {
        session_id: session.into(),
        chat_address: chat.into(),
        remote_id: remote_id.into(),
        direction: Direction::FromOther,
        content: MessageContent::text(format!("body of {remote_id}")),
        sender: None,
        quoted_remote_id: None,
        status: DeliveryStatus::Delivered,
        timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        deleted: false,
        reaction: None,
        metadata: None,
        chat: ChatPatch::default(),
    }
}

#[tokio::test]
async fn deleting_a_chat_cascades_to_messages_and_relations() {
    let (storage, _dir) = storage().await;
    let chat = "+551199999@remote";

    let mut local_ids = Vec::new();
    for remote in ["wa-1", "wa-2", "wa-3"] {
        let id = storage
            .upsert_message(&message("S1", chat, remote))
            .await
            .unwrap()
            .message
            .id;
        storage
            .create_or_update(&RelationDraft::outbound("S1", id))
            .await
            .unwrap();
        local_ids.push(id);
    }
    let survivor = storage
        .upsert_message(&message("S1", "other@remote", "wa-9"))
        .await
        .unwrap()
        .message
        .id;
    storage
        .create_or_update(&RelationDraft::outbound("S1", survivor))
        .await
        .unwrap();

    assert_eq!(storage.delete_chat("S1", chat).await.unwrap(), Some(3));

    for id in local_ids {
        assert!(storage.get_message(id).await.unwrap().is_none());
        assert!(storage.find_by_local_message(id).await.unwrap().is_none());
    }
    assert!(storage.find_by_local_message(survivor).await.unwrap().is_some());
    assert_eq!(storage.count_by_status("S1").await.unwrap().pending, 1);
}

#[tokio::test]
async fn sessions_never_see_each_others_rows() {
    let (storage, _dir) = storage().await;
    let a = storage
        .upsert_message(&message("S1", "shared@remote", "wa-1"))
        .await
        .unwrap();
    let b = storage
        .upsert_message(&message("S2", "shared@remote", "wa-1"))
        .await
        .unwrap();

    assert!(a.created && b.created);
    assert_ne!(a.message.id, b.message.id);
    assert_ne!(a.message.chat_id, b.message.chat_id);
    assert_eq!(
        storage
            .get_message_by_remote_id("S2", "wa-1")
            .await
            .unwrap()
            .unwrap()
            .id,
        b.message.id
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ingestion_of_one_event_yields_one_row() {
    let (storage, _dir) = storage().await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let storage = Arc::clone(&storage);
        handles.push(tokio::spawn(async move {
            storage
                .upsert_message(&message("S1", "a@remote", "wa-100"))
                .await
                .unwrap()
        }));
    }
    let mut created = 0;
    let mut ids = Vec::new();
    for handle in handles {
        let outcome = handle.await.unwrap();
        created += usize::from(outcome.created);
        ids.push(outcome.message.id);
    }

    assert_eq!(created, 1);
    ids.dedup();
    assert_eq!(ids.len(), 1);
    let chat = storage.get_chat("S1", "a@remote").await.unwrap().unwrap();
    assert_eq!(chat.unread_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reconciliation_yields_one_relation() {
    let (storage, _dir) = storage().await;
    let local = storage
        .upsert_message(&message("S1", "a@remote", "wa-100"))
        .await
        .unwrap()
        .message
        .id;

    let mut handles = Vec::new();
    for attempt in 0..12 {
        let storage = Arc::clone(&storage);
        handles.push(tokio::spawn(async move {
            let mut draft = RelationDraft::outbound("S1", local);
            if attempt % 2 == 0 {
                draft.status = SyncStatus::Synced;
                draft.mirror_conversation_id = Some("S1:a@remote".into());
                draft.mirror_message_id = Some("cw-55".into());
            }
            storage.create_or_update(&draft).await.unwrap().id
        }));
    }
    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.dedup();
    assert_eq!(ids.len(), 1, "every attempt must land on the same relation");

    let counts = storage.count_by_status("S1").await.unwrap();
    assert_eq!(counts.pending + counts.synced + counts.failed, 1);

    let relation = storage.find_by_local_message(local).await.unwrap().unwrap();
    assert_eq!(
        relation.mirror_ref(),
        Some(MirrorMessageRef {
            conversation_id: "S1:a@remote".into(),
            message_id: "cw-55".into(),
        })
    );
}

#[tokio::test]
async fn find_chat_by_mirror_conversation_follows_relations() {
    let (storage, _dir) = storage().await;
    let msg = storage
        .upsert_message(&message("S1", "a@remote", "wa-1"))
        .await
        .unwrap()
        .message;
    let mut draft = RelationDraft::outbound("S1", msg.id);
    draft.mirror_conversation_id = Some("conv-7".into());
    draft.mirror_message_id = Some("cw-1".into());
    draft.status = SyncStatus::Synced;
    storage.create_or_update(&draft).await.unwrap();

    let chat = storage
        .find_chat_by_mirror_conversation("S1", "conv-7")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(chat.id, msg.chat_id);
    assert!(storage
        .find_chat_by_mirror_conversation("S2", "conv-7")
        .await
        .unwrap()
        .is_none());
}
