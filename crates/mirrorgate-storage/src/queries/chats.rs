// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat aggregate operations.
//!
//! Unread counters and activity timestamps are only written by the narrow
//! single-statement mutations below, never by the general upsert.

use chrono::{DateTime, Utc};
use mirrorgate_core::types::{Chat, ChatPatch, Page};
use mirrorgate_core::MirrorgateError;
use rusqlite::{params, Connection, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::{format_ts, now_ts, to_json, ChatRow};

/// Insert or merge a chat inside an open transaction. Returns the chat id.
pub(crate) fn upsert_chat_in(
    conn: &Connection,
    session_id: &str,
    address: &str,
    patch: &ChatPatch,
    metadata: Option<&str>,
    now: &str,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO chats (session_id, address, name, is_group, archived, pinned, muted,
                            metadata, created_at, updated_at)
         VALUES (?1, ?2, ?3, COALESCE(?4, 0), COALESCE(?5, 0), COALESCE(?6, 0), COALESCE(?7, 0),
                 ?8, ?9, ?9)
         ON CONFLICT (session_id, address) DO UPDATE SET
             name = COALESCE(?3, name),
             is_group = COALESCE(?4, is_group),
             archived = COALESCE(?5, archived),
             pinned = COALESCE(?6, pinned),
             muted = COALESCE(?7, muted),
             metadata = COALESCE(?8, metadata),
             updated_at = ?9",
        params![
            session_id,
            address,
            patch.name,
            patch.is_group,
            patch.archived,
            patch.pinned,
            patch.muted,
            metadata,
            now,
        ],
    )?;
    conn.query_row(
        "SELECT id FROM chats WHERE session_id = ?1 AND address = ?2",
        params![session_id, address],
        |row| row.get(0),
    )
}

pub(crate) fn load_chat(conn: &Connection, id: i64) -> rusqlite::Result<Option<ChatRow>> {
    conn.query_row(
        &format!("SELECT {} FROM chats WHERE id = ?1", ChatRow::COLUMNS),
        params![id],
        ChatRow::from_row,
    )
    .optional()
}

/// Idempotent create-or-merge keyed on `(session_id, address)`.
pub async fn upsert_chat(
    db: &Database,
    session_id: &str,
    address: &str,
    patch: &ChatPatch,
) -> Result<Chat, MirrorgateError> {
    let session_id = session_id.to_string();
    let address = address.to_string();
    let patch = patch.clone();
    let metadata = patch.metadata.as_ref().map(to_json).transpose()?;
    let row = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let id = upsert_chat_in(&tx, &session_id, &address, &patch, metadata.as_deref(), &now_ts())?;
            let row = load_chat(&tx, id)?;
            tx.commit()?;
            Ok(row)
        })
        .await
        .map_err(map_tr_err)?;
    row.ok_or_else(|| MirrorgateError::Internal("upserted chat vanished".to_string()))?
        .decode()
}

/// Get a chat by its natural key.
pub async fn get_chat(
    db: &Database,
    session_id: &str,
    address: &str,
) -> Result<Option<Chat>, MirrorgateError> {
    let session_id = session_id.to_string();
    let address = address.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM chats WHERE session_id = ?1 AND address = ?2",
                    ChatRow::COLUMNS
                ),
                params![session_id, address],
                ChatRow::from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?
        .map(ChatRow::decode)
        .transpose()
}

/// Get a chat by its internal id.
pub async fn get_chat_by_id(db: &Database, id: i64) -> Result<Option<Chat>, MirrorgateError> {
    db.connection()
        .call(move |conn| load_chat(conn, id))
        .await
        .map_err(map_tr_err)?
        .map(ChatRow::decode)
        .transpose()
}

/// List chats newest activity first. Chats without activity sort last.
pub async fn list_chats(
    db: &Database,
    session_id: &str,
    include_archived: bool,
    page: Page,
) -> Result<Vec<Chat>, MirrorgateError> {
    let session_id = session_id.to_string();
    let rows = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM chats
                 WHERE session_id = ?1 AND (?2 OR archived = 0)
                 ORDER BY last_activity_at IS NULL, last_activity_at DESC, id DESC
                 LIMIT ?3 OFFSET ?4",
                ChatRow::COLUMNS
            ))?;
            let rows = stmt
                .query_map(
                    params![session_id, include_archived, page.limit, page.offset],
                    ChatRow::from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)?;
    crate::models::decode_all(rows, ChatRow::decode)
}

/// Resolve the chat whose messages are mirrored into `conversation_id`.
pub async fn find_chat_by_mirror_conversation(
    db: &Database,
    session_id: &str,
    conversation_id: &str,
) -> Result<Option<Chat>, MirrorgateError> {
    let session_id = session_id.to_string();
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM chats WHERE session_id = ?1 AND id = (
                         SELECT m.chat_id FROM sync_relations r
                         JOIN messages m ON m.id = r.local_message_id
                         WHERE r.session_id = ?1 AND r.mirror_conversation_id = ?2
                         ORDER BY r.id DESC LIMIT 1)",
                    ChatRow::COLUMNS
                ),
                params![session_id, conversation_id],
                ChatRow::from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?
        .map(ChatRow::decode)
        .transpose()
}

async fn update_chat(
    db: &Database,
    chat_id: i64,
    sql: &'static str,
    value: rusqlite::types::Value,
) -> Result<(), MirrorgateError> {
    let changed = db
        .connection()
        .call(move |conn| conn.execute(sql, params![chat_id, value, now_ts()]))
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(MirrorgateError::NotFound {
            entity: "chat",
            key: chat_id.to_string(),
        });
    }
    Ok(())
}

pub async fn set_unread_count(db: &Database, chat_id: i64, count: i64) -> Result<(), MirrorgateError> {
    if count < 0 {
        return Err(MirrorgateError::Validation(format!(
            "unread count must not be negative, got {count}"
        )));
    }
    update_chat(
        db,
        chat_id,
        "UPDATE chats SET unread_count = ?2, updated_at = ?3 WHERE id = ?1",
        count.into(),
    )
    .await
}

pub async fn increment_unread(db: &Database, chat_id: i64) -> Result<(), MirrorgateError> {
    update_chat(
        db,
        chat_id,
        "UPDATE chats SET unread_count = unread_count + ?2, updated_at = ?3 WHERE id = ?1",
        1i64.into(),
    )
    .await
}

/// Move the activity timestamp forward. An older `at` is ignored.
pub async fn touch_last_activity(
    db: &Database,
    chat_id: i64,
    at: DateTime<Utc>,
) -> Result<(), MirrorgateError> {
    update_chat(
        db,
        chat_id,
        "UPDATE chats SET
             last_activity_at = CASE
                 WHEN last_activity_at IS NULL OR last_activity_at < ?2 THEN ?2
                 ELSE last_activity_at END,
             updated_at = ?3
         WHERE id = ?1",
        format_ts(at).into(),
    )
    .await
}

pub async fn set_archived(db: &Database, chat_id: i64, archived: bool) -> Result<(), MirrorgateError> {
    update_chat(
        db,
        chat_id,
        "UPDATE chats SET archived = ?2, updated_at = ?3 WHERE id = ?1",
        i64::from(archived).into(),
    )
    .await
}

pub async fn set_pinned(db: &Database, chat_id: i64, pinned: bool) -> Result<(), MirrorgateError> {
    update_chat(
        db,
        chat_id,
        "UPDATE chats SET pinned = ?2, updated_at = ?3 WHERE id = ?1",
        i64::from(pinned).into(),
    )
    .await
}

pub async fn set_muted(db: &Database, chat_id: i64, muted: bool) -> Result<(), MirrorgateError> {
    update_chat(
        db,
        chat_id,
        "UPDATE chats SET muted = ?2, updated_at = ?3 WHERE id = ?1",
        i64::from(muted).into(),
    )
    .await
}

/// Hard-delete a chat. Its messages and their relations go with it.
///
/// Returns the number of relations removed, or `None` if the chat did not exist.
pub async fn delete_chat(
    db: &Database,
    session_id: &str,
    address: &str,
) -> Result<Option<u64>, MirrorgateError> {
    let session_id = session_id.to_string();
    let address = address.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let chat_id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM chats WHERE session_id = ?1 AND address = ?2",
                    params![session_id, address],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(chat_id) = chat_id else {
                return Ok(None);
            };
            let relations: i64 = tx.query_row(
                "SELECT COUNT(*) FROM sync_relations r
                 JOIN messages m ON m.id = r.local_message_id
                 WHERE m.chat_id = ?1",
                params![chat_id],
                |row| row.get(0),
            )?;
            tx.execute("DELETE FROM chats WHERE id = ?1", params![chat_id])?;
            tx.commit()?;
            Ok(Some(relations as u64))
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("chats.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn upsert_chat_is_idempotent_and_merges_only_given_fields() {
        let (db, _dir) = setup_db().await;

        let patch = ChatPatch {
            name: Some("Alice".into()),
            is_group: Some(false),
            ..ChatPatch::default()
        };
        let first = upsert_chat(&db, "S1", "+551199999@remote", &patch).await.unwrap();
        increment_unread(&db, first.id).await.unwrap();

        let pin = ChatPatch {
            pinned: Some(true),
            ..ChatPatch::default()
        };
        let second = upsert_chat(&db, "S1", "+551199999@remote", &pin).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name.as_deref(), Some("Alice"));
        assert!(second.pinned);
        assert_eq!(second.unread_count, 1, "upsert must not reset the unread counter");
    }

    #[tokio::test]
    async fn chats_are_scoped_by_session() {
        let (db, _dir) = setup_db().await;
        let a = upsert_chat(&db, "S1", "group@remote", &ChatPatch::default()).await.unwrap();
        let b = upsert_chat(&db, "S2", "group@remote", &ChatPatch::default()).await.unwrap();
        assert_ne!(a.id, b.id);
        assert!(get_chat(&db, "S3", "group@remote").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn listing_orders_by_activity_and_hides_archived() {
        let (db, _dir) = setup_db().await;
        let old = upsert_chat(&db, "S1", "old@remote", &ChatPatch::default()).await.unwrap();
        let new = upsert_chat(&db, "S1", "new@remote", &ChatPatch::default()).await.unwrap();
        let archived = upsert_chat(&db, "S1", "archived@remote", &ChatPatch::default())
            .await
            .unwrap();

        touch_last_activity(&db, old.id, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
            .await
            .unwrap();
        touch_last_activity(&db, new.id, Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap())
            .await
            .unwrap();
        set_archived(&db, archived.id, true).await.unwrap();

        let listed = list_chats(&db, "S1", false, Page::default()).await.unwrap();
        let addresses: Vec<_> = listed.iter().map(|c| c.address.as_str()).collect();
        assert_eq!(addresses, vec!["new@remote", "old@remote"]);

        let all = list_chats(&db, "S1", true, Page::default()).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn last_activity_never_moves_backwards() {
        let (db, _dir) = setup_db().await;
        let chat = upsert_chat(&db, "S1", "a@remote", &ChatPatch::default()).await.unwrap();
        let later = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        touch_last_activity(&db, chat.id, later).await.unwrap();
        touch_last_activity(&db, chat.id, later - chrono::Duration::hours(1))
            .await
            .unwrap();
        let chat = get_chat(&db, "S1", "a@remote").await.unwrap().unwrap();
        assert_eq!(chat.last_activity_at, Some(later));
    }

    #[tokio::test]
    async fn narrow_mutations_on_unknown_chat_are_not_found() {
        let (db, _dir) = setup_db().await;
        assert!(matches!(
            set_muted(&db, 999, true).await,
            Err(MirrorgateError::NotFound { entity: "chat", .. })
        ));
        assert!(matches!(
            set_unread_count(&db, 1, -1).await,
            Err(MirrorgateError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn delete_unknown_chat_returns_none() {
        let (db, _dir) = setup_db().await;
        assert_eq!(delete_chat(&db, "S1", "ghost@remote").await.unwrap(), None);
    }
}
