// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message store operations.

use std::str::FromStr;

use mirrorgate_core::types::{
    DeliveryStatus, Direction, Message, NewMessage, Page, TimeRange, UpsertOutcome,
};
use mirrorgate_core::MirrorgateError;
use rusqlite::{params, Connection, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::{format_ts, now_ts, to_json, MessageRow};
use crate::queries::chats::upsert_chat_in;

const STATUS_COLUMN: usize = 9;

fn stored_status(value: &str) -> rusqlite::Result<DeliveryStatus> {
    DeliveryStatus::from_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            STATUS_COLUMN,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

fn load_message(conn: &Connection, id: i64) -> rusqlite::Result<Option<MessageRow>> {
    conn.query_row(
        &format!("SELECT {} FROM messages WHERE id = ?1", MessageRow::COLUMNS),
        params![id],
        MessageRow::from_row,
    )
    .optional()
}

// Chat side effect of a new or edited message.
fn bump_activity(conn: &Connection, chat_id: i64, at: &str, now: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE chats SET
             last_activity_at = CASE
                 WHEN last_activity_at IS NULL OR last_activity_at < ?2 THEN ?2
                 ELSE last_activity_at END,
             updated_at = ?3
         WHERE id = ?1",
        params![chat_id, at, now],
    )?;
    Ok(())
}

fn not_found(id: i64) -> MirrorgateError {
    MirrorgateError::NotFound {
        entity: "message",
        key: id.to_string(),
    }
}

/// Insert the message, or merge it into the existing `(session_id, remote_id)` row.
///
/// The owning chat is created on first sight. A new message moves the chat's
/// last activity forward and, when it came from the other party, bumps the
/// unread counter. A content edit moves last activity to the edit time.
pub async fn upsert_message(db: &Database, msg: &NewMessage) -> Result<UpsertOutcome, MirrorgateError> {
    msg.validate()?;
    let content = to_json(&msg.content)?;
    let content_type = msg.content.content_type().to_string();
    let metadata = msg.metadata.as_ref().map(to_json).transpose()?;
    let chat_metadata = msg.chat.metadata.as_ref().map(to_json).transpose()?;
    let msg = msg.clone();

    let (row, created, content_changed, newly_deleted) = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let now = now_ts();
            let timestamp = format_ts(msg.timestamp);
            let chat_id = upsert_chat_in(
                &tx,
                &msg.session_id,
                &msg.chat_address,
                &msg.chat,
                chat_metadata.as_deref(),
                &now,
            )?;

            let existing = tx
                .query_row(
                    &format!(
                        "SELECT {} FROM messages WHERE session_id = ?1 AND remote_id = ?2",
                        MessageRow::COLUMNS
                    ),
                    params![msg.session_id, msg.remote_id],
                    MessageRow::from_row,
                )
                .optional()?;

            let (id, created, content_changed, newly_deleted) = match existing {
                None => {
                    let deleted_at = msg.deleted.then(|| now.clone());
                    tx.execute(
                        "INSERT INTO messages (session_id, chat_id, remote_id, direction, content_type,
                             content, sender, quoted_remote_id, status, timestamp, deleted_at,
                             reaction, metadata, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
                        params![
                            msg.session_id,
                            chat_id,
                            msg.remote_id,
                            msg.direction.to_string(),
                            content_type,
                            content,
                            msg.sender,
                            msg.quoted_remote_id,
                            msg.status.to_string(),
                            timestamp,
                            deleted_at,
                            msg.reaction,
                            metadata,
                            now,
                        ],
                    )?;
                    let id = tx.last_insert_rowid();
                    bump_activity(&tx, chat_id, &timestamp, &now)?;
                    if msg.direction == Direction::FromOther && !msg.deleted {
                        tx.execute(
                            "UPDATE chats SET unread_count = unread_count + 1 WHERE id = ?1",
                            params![chat_id],
                        )?;
                    }
                    (id, true, false, false)
                }
                Some(row) => {
                    let live = row.deleted_at.is_none();
                    let content_changed = live && !msg.deleted && row.content != content;
                    let newly_deleted = live && msg.deleted;
                    let status = stored_status(&row.status)?.advance(msg.status);
                    tx.execute(
                        "UPDATE messages SET
                             content = CASE WHEN ?2 THEN ?3 ELSE content END,
                             content_type = CASE WHEN ?2 THEN ?4 ELSE content_type END,
                             edited_at = CASE WHEN ?2 THEN ?5 ELSE edited_at END,
                             deleted_at = CASE WHEN ?6 THEN ?5 ELSE deleted_at END,
                             status = ?7,
                             sender = COALESCE(sender, ?8),
                             quoted_remote_id = COALESCE(quoted_remote_id, ?9),
                             reaction = COALESCE(?10, reaction),
                             metadata = COALESCE(?11, metadata),
                             updated_at = ?5
                         WHERE id = ?1",
                        params![
                            row.id,
                            content_changed,
                            content,
                            content_type,
                            now,
                            newly_deleted,
                            status.to_string(),
                            msg.sender,
                            msg.quoted_remote_id,
                            msg.reaction,
                            metadata,
                        ],
                    )?;
                    if content_changed {
                        bump_activity(&tx, row.chat_id, &now, &now)?;
                    }
                    (row.id, false, content_changed, newly_deleted)
                }
            };

            let row = load_message(&tx, id)?;
            tx.commit()?;
            Ok((row, created, content_changed, newly_deleted))
        })
        .await
        .map_err(map_tr_err)?;

    let message = row
        .ok_or_else(|| MirrorgateError::Internal("upserted message vanished".to_string()))?
        .decode()?;
    Ok(UpsertOutcome {
        message,
        created,
        content_changed,
        newly_deleted,
    })
}

pub async fn get_message_by_remote_id(
    db: &Database,
    session_id: &str,
    remote_id: &str,
) -> Result<Option<Message>, MirrorgateError> {
    let session_id = session_id.to_string();
    let remote_id = remote_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM messages WHERE session_id = ?1 AND remote_id = ?2",
                    MessageRow::COLUMNS
                ),
                params![session_id, remote_id],
                MessageRow::from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?
        .map(MessageRow::decode)
        .transpose()
}

pub async fn get_message(db: &Database, id: i64) -> Result<Option<Message>, MirrorgateError> {
    db.connection()
        .call(move |conn| load_message(conn, id))
        .await
        .map_err(map_tr_err)?
        .map(MessageRow::decode)
        .transpose()
}

/// Soft-delete. Returns `false` when the message was already deleted.
pub async fn mark_deleted(db: &Database, id: i64) -> Result<bool, MirrorgateError> {
    let outcome = db
        .connection()
        .call(move |conn| {
            let now = now_ts();
            let changed = conn.execute(
                "UPDATE messages SET deleted_at = ?2, updated_at = ?2
                 WHERE id = ?1 AND deleted_at IS NULL",
                params![id, now],
            )?;
            if changed > 0 {
                return Ok(Some(true));
            }
            let exists: Option<i64> = conn
                .query_row("SELECT id FROM messages WHERE id = ?1", params![id], |row| row.get(0))
                .optional()?;
            Ok(exists.map(|_| false))
        })
        .await
        .map_err(map_tr_err)?;
    outcome.ok_or_else(|| not_found(id))
}

/// Replace the single reaction slot. `None` clears it.
pub async fn set_reaction(db: &Database, id: i64, reaction: Option<&str>) -> Result<(), MirrorgateError> {
    let reaction = reaction.map(str::to_string);
    let changed = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE messages SET reaction = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, reaction, now_ts()],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(not_found(id));
    }
    Ok(())
}

/// Advance the delivery status. A receipt older than the stored status is ignored.
pub async fn update_delivery_status(
    db: &Database,
    id: i64,
    status: DeliveryStatus,
) -> Result<(), MirrorgateError> {
    let found = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let current: Option<String> = tx
                .query_row("SELECT status FROM messages WHERE id = ?1", params![id], |row| {
                    row.get(0)
                })
                .optional()?;
            let Some(current) = current else {
                return Ok(false);
            };
            let next = stored_status(&current)?.advance(status);
            if next.to_string() != current {
                tx.execute(
                    "UPDATE messages SET status = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, next.to_string(), now_ts()],
                )?;
            }
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)?;
    if !found {
        return Err(not_found(id));
    }
    Ok(())
}

/// Live messages of a chat, newest first.
pub async fn list_by_chat(
    db: &Database,
    chat_id: i64,
    range: TimeRange,
    page: Page,
) -> Result<Vec<Message>, MirrorgateError> {
    let from = range.from.map(format_ts);
    let until = range.until.map(format_ts);
    let rows = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM messages
                 WHERE chat_id = ?1 AND deleted_at IS NULL
                   AND (?2 IS NULL OR timestamp >= ?2)
                   AND (?3 IS NULL OR timestamp <= ?3)
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?4 OFFSET ?5",
                MessageRow::COLUMNS
            ))?;
            let rows = stmt
                .query_map(
                    params![chat_id, from, until, page.limit, page.offset],
                    MessageRow::from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)?;
    crate::models::decode_all(rows, MessageRow::decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::chats::get_chat;
    use chrono::{TimeZone, Utc};
    use mirrorgate_core::types::{ChatPatch, MessageContent};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("messages.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn make_msg(remote_id: &str, body: &str, second: u32) -> NewMessage {
        NewMessage {
            session_id: "S1".into(),
            chat_address: "+551199999@remote".into(),
            remote_id: remote_id.into(),
            direction: Direction::FromOther,
            content: MessageContent::text(body),
            sender: Some("+551199999@remote".into()),
            quoted_remote_id: None,
            status: DeliveryStatus::Delivered,
            timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, second).unwrap(),
            deleted: false,
            reaction: None,
            metadata: None,
            chat: ChatPatch {
                name: Some("Alice".into()),
                ..ChatPatch::default()
            },
        }
    }

    #[tokio::test]
    async fn duplicate_delivery_upserts_one_row() {
        let (db, _dir) = setup_db().await;
        let msg = make_msg("wa-100", "hello", 1);

        let first = upsert_message(&db, &msg).await.unwrap();
        let second = upsert_message(&db, &msg).await.unwrap();
        let third = upsert_message(&db, &msg).await.unwrap();

        assert!(first.created);
        assert!(!second.created && !third.created);
        assert!(!second.content_changed);
        assert_eq!(first.message.id, third.message.id);

        let chat = get_chat(&db, "S1", "+551199999@remote").await.unwrap().unwrap();
        assert_eq!(chat.unread_count, 1, "redelivery must not bump unread");
        assert_eq!(chat.name.as_deref(), Some("Alice"));
        assert_eq!(chat.last_activity_at, Some(msg.timestamp));
    }

    #[tokio::test]
    async fn edit_reports_content_change_and_keeps_identity() {
        let (db, _dir) = setup_db().await;
        let original = upsert_message(&db, &make_msg("wa-100", "hello", 1)).await.unwrap();
        let edited = upsert_message(&db, &make_msg("wa-100", "hello, edited", 1))
            .await
            .unwrap();

        assert!(edited.content_changed);
        assert_eq!(original.message.id, edited.message.id);
        assert_eq!(edited.message.content, MessageContent::text("hello, edited"));
        assert!(edited.message.edited_at.is_some());
    }

    #[tokio::test]
    async fn own_messages_do_not_count_as_unread() {
        let (db, _dir) = setup_db().await;
        let mut msg = make_msg("wa-200", "sent by me", 2);
        msg.direction = Direction::FromMe;
        upsert_message(&db, &msg).await.unwrap();
        let chat = get_chat(&db, "S1", "+551199999@remote").await.unwrap().unwrap();
        assert_eq!(chat.unread_count, 0);
    }

    #[tokio::test]
    async fn delivery_status_only_advances() {
        let (db, _dir) = setup_db().await;
        let mut msg = make_msg("wa-300", "status", 3);
        msg.status = DeliveryStatus::Read;
        let stored = upsert_message(&db, &msg).await.unwrap().message;

        msg.status = DeliveryStatus::Sent;
        let merged = upsert_message(&db, &msg).await.unwrap().message;
        assert_eq!(merged.status, DeliveryStatus::Read);

        update_delivery_status(&db, stored.id, DeliveryStatus::Delivered)
            .await
            .unwrap();
        let reloaded = get_message(&db, stored.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, DeliveryStatus::Read);
    }

    #[tokio::test]
    async fn deleted_messages_leave_default_listing() {
        let (db, _dir) = setup_db().await;
        let a = upsert_message(&db, &make_msg("wa-1", "one", 1)).await.unwrap().message;
        let b = upsert_message(&db, &make_msg("wa-2", "two", 2)).await.unwrap().message;
        upsert_message(&db, &make_msg("wa-3", "three", 3)).await.unwrap();

        assert!(mark_deleted(&db, b.id).await.unwrap());
        assert!(!mark_deleted(&db, b.id).await.unwrap());

        let listed = list_by_chat(&db, a.chat_id, TimeRange::default(), Page::default())
            .await
            .unwrap();
        let ids: Vec<_> = listed.iter().map(|m| m.remote_id.as_str()).collect();
        assert_eq!(ids, vec!["wa-3", "wa-1"]);

        let still_there = get_message(&db, b.id).await.unwrap().unwrap();
        assert!(still_there.is_deleted());
    }

    #[tokio::test]
    async fn deletion_through_upsert_is_reported_once() {
        let (db, _dir) = setup_db().await;
        let mut msg = make_msg("wa-400", "bye", 4);
        upsert_message(&db, &msg).await.unwrap();
        msg.deleted = true;
        assert!(upsert_message(&db, &msg).await.unwrap().newly_deleted);
        assert!(!upsert_message(&db, &msg).await.unwrap().newly_deleted);
    }

    #[tokio::test]
    async fn time_range_bounds_are_inclusive() {
        let (db, _dir) = setup_db().await;
        let chat_id = upsert_message(&db, &make_msg("wa-1", "one", 1))
            .await
            .unwrap()
            .message
            .chat_id;
        upsert_message(&db, &make_msg("wa-2", "two", 2)).await.unwrap();
        upsert_message(&db, &make_msg("wa-3", "three", 3)).await.unwrap();

        let range = TimeRange {
            from: Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 2).unwrap()),
            until: Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 3).unwrap()),
        };
        let listed = list_by_chat(&db, chat_id, range, Page::new(10, 0)).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].remote_id, "wa-3");
    }

    #[tokio::test]
    async fn reaction_slot_is_replaced_and_cleared() {
        let (db, _dir) = setup_db().await;
        let msg = upsert_message(&db, &make_msg("wa-500", "react", 5)).await.unwrap().message;
        set_reaction(&db, msg.id, Some("👍")).await.unwrap();
        set_reaction(&db, msg.id, Some("❤️")).await.unwrap();
        assert_eq!(
            get_message(&db, msg.id).await.unwrap().unwrap().reaction.as_deref(),
            Some("❤️")
        );
        set_reaction(&db, msg.id, None).await.unwrap();
        assert!(get_message(&db, msg.id).await.unwrap().unwrap().reaction.is_none());
        assert!(matches!(
            set_reaction(&db, 9999, None).await,
            Err(MirrorgateError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn invalid_message_is_rejected_before_any_write() {
        let (db, _dir) = setup_db().await;
        let mut msg = make_msg("", "nope", 6);
        msg.remote_id = String::new();
        assert!(matches!(
            upsert_message(&db, &msg).await,
            Err(MirrorgateError::Validation(_))
        ));
        assert!(get_chat(&db, "S1", "+551199999@remote").await.unwrap().is_none());
    }
}
