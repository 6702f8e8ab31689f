// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synchronization relation operations.
//!
//! `create_or_update` is the serialization point for concurrent reconciliation
//! of the same message: the lookup and the write share one transaction on the
//! single writer thread, and the UNIQUE constraints make a second row for the
//! same key impossible even if a caller bypasses the lookup.

use chrono::{DateTime, Utc};
use mirrorgate_core::types::{
    MirrorMessageRef, RelationCounts, RelationDirection, RelationDraft, RelationFailure,
    SyncRelation, SyncStatus,
};
use mirrorgate_core::MirrorgateError;
use rusqlite::{params, Connection, OptionalExtension, ToSql};

use crate::database::{map_tr_err, Database};
use crate::models::{decode_all, format_ts, now_ts, to_json, RelationRow};

/// Failure columns, pre-rendered so they can move into a query closure.
#[derive(Debug, Clone)]
struct FailureColumns {
    kind: String,
    detail: String,
    next_retry_at: Option<String>,
}

impl From<&RelationFailure> for FailureColumns {
    fn from(failure: &RelationFailure) -> Self {
        Self {
            kind: failure.kind.to_string(),
            detail: failure.detail.clone(),
            next_retry_at: failure.next_retry_at.map(format_ts),
        }
    }
}

fn find_row(
    conn: &Connection,
    filter: &str,
    args: &[&dyn ToSql],
) -> rusqlite::Result<Option<RelationRow>> {
    conn.query_row(
        &format!("SELECT {} FROM sync_relations WHERE {filter}", RelationRow::COLUMNS),
        args,
        RelationRow::from_row,
    )
    .optional()
}

fn load_relation(conn: &Connection, id: i64) -> rusqlite::Result<Option<RelationRow>> {
    find_row(conn, "id = ?1", &[&id])
}

/// Write a status transition. Synced clears failure detail; Failed records it
/// and counts an attempt; Pending keeps the last error visible.
fn apply_status(
    conn: &Connection,
    id: i64,
    status: SyncStatus,
    failure: Option<&FailureColumns>,
    now: &str,
) -> rusqlite::Result<usize> {
    match status {
        SyncStatus::Synced => conn.execute(
            "UPDATE sync_relations SET status = 'synced', last_error = NULL,
                 failure_kind = NULL, next_retry_at = NULL, updated_at = ?2
             WHERE id = ?1",
            params![id, now],
        ),
        SyncStatus::Pending => conn.execute(
            "UPDATE sync_relations SET status = 'pending', next_retry_at = NULL, updated_at = ?2
             WHERE id = ?1",
            params![id, now],
        ),
        SyncStatus::Failed => conn.execute(
            "UPDATE sync_relations SET status = 'failed',
                 last_error = COALESCE(?2, last_error),
                 failure_kind = COALESCE(?3, failure_kind, 'transient'),
                 next_retry_at = ?4,
                 retry_count = retry_count + 1,
                 updated_at = ?5
             WHERE id = ?1",
            params![
                id,
                failure.map(|f| f.detail.as_str()),
                failure.map(|f| f.kind.as_str()),
                failure.and_then(|f| f.next_retry_at.as_deref()),
                now,
            ],
        ),
    }
}

fn not_found(id: i64) -> MirrorgateError {
    MirrorgateError::NotFound {
        entity: "relation",
        key: id.to_string(),
    }
}

pub async fn find_by_local_message(
    db: &Database,
    local_message_id: i64,
) -> Result<Option<SyncRelation>, MirrorgateError> {
    db.connection()
        .call(move |conn| find_row(conn, "local_message_id = ?1", &[&local_message_id]))
        .await
        .map_err(map_tr_err)?
        .map(RelationRow::decode)
        .transpose()
}

pub async fn find_by_mirror_message(
    db: &Database,
    session_id: &str,
    mirror: &MirrorMessageRef,
) -> Result<Option<SyncRelation>, MirrorgateError> {
    let session_id = session_id.to_string();
    let mirror = mirror.clone();
    db.connection()
        .call(move |conn| {
            find_row(
                conn,
                "session_id = ?1 AND mirror_conversation_id = ?2 AND mirror_message_id = ?3",
                &[&session_id, &mirror.conversation_id, &mirror.message_id],
            )
        })
        .await
        .map_err(map_tr_err)?
        .map(RelationRow::decode)
        .transpose()
}

pub async fn find_by_echo_token(
    db: &Database,
    session_id: &str,
    token: &str,
) -> Result<Option<SyncRelation>, MirrorgateError> {
    let session_id = session_id.to_string();
    let token = token.to_string();
    db.connection()
        .call(move |conn| {
            find_row(conn, "session_id = ?1 AND echo_token = ?2", &[&session_id, &token])
        })
        .await
        .map_err(map_tr_err)?
        .map(RelationRow::decode)
        .transpose()
}

pub async fn find_by_source_token(
    db: &Database,
    session_id: &str,
    token: &str,
) -> Result<Option<SyncRelation>, MirrorgateError> {
    let session_id = session_id.to_string();
    let token = token.to_string();
    db.connection()
        .call(move |conn| {
            find_row(
                conn,
                "session_id = ?1 AND source_token = ?2 ORDER BY id LIMIT 1",
                &[&session_id, &token],
            )
        })
        .await
        .map_err(map_tr_err)?
        .map(RelationRow::decode)
        .transpose()
}

pub async fn get_relation(db: &Database, id: i64) -> Result<Option<SyncRelation>, MirrorgateError> {
    db.connection()
        .call(move |conn| load_relation(conn, id))
        .await
        .map_err(map_tr_err)?
        .map(RelationRow::decode)
        .transpose()
}

/// Insert the relation, or merge into the row already holding its key.
///
/// Outbound drafts are keyed by `local_message_id`; inbound drafts by the
/// mirror identifiers, falling back to `local_message_id`. Mirror identifiers
/// and tokens are write-once: a merge never replaces an assigned value.
/// Extensions are merged key by key.
pub async fn create_or_update(
    db: &Database,
    draft: &RelationDraft,
) -> Result<SyncRelation, MirrorgateError> {
    draft.validate()?;
    let extensions = to_json(&draft.extensions)?;
    let failure = draft.failure.as_ref().map(FailureColumns::from);
    let draft = draft.clone();

    let row = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let now = now_ts();

            let by_local = |tx: &Connection| {
                find_row(
                    tx,
                    "session_id = ?1 AND local_message_id = ?2",
                    &[&draft.session_id, &draft.local_message_id],
                )
            };
            let existing = match draft.direction {
                RelationDirection::OutboundToMirror => by_local(&*tx)?,
                RelationDirection::InboundFromMirror => match find_row(
                    &tx,
                    "session_id = ?1 AND mirror_conversation_id = ?2 AND mirror_message_id = ?3",
                    &[
                        &draft.session_id,
                        &draft.mirror_conversation_id,
                        &draft.mirror_message_id,
                    ],
                )? {
                    Some(row) => Some(row),
                    None => by_local(&*tx)?,
                },
            };

            let id = match existing {
                Some(row) => {
                    tx.execute(
                        "UPDATE sync_relations SET
                             mirror_conversation_id = COALESCE(mirror_conversation_id, ?2),
                             mirror_message_id = COALESCE(mirror_message_id, ?3),
                             echo_token = COALESCE(echo_token, ?4),
                             source_token = COALESCE(source_token, ?5),
                             extensions = json_patch(extensions, ?6),
                             updated_at = ?7
                         WHERE id = ?1",
                        params![
                            row.id,
                            draft.mirror_conversation_id,
                            draft.mirror_message_id,
                            draft.echo_token,
                            draft.source_token,
                            extensions,
                            now,
                        ],
                    )?;
                    row.id
                }
                None => {
                    tx.execute(
                        "INSERT INTO sync_relations (session_id, local_message_id,
                             mirror_conversation_id, mirror_message_id, direction, status,
                             echo_token, source_token, extensions, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7, ?8, ?9, ?9)",
                        params![
                            draft.session_id,
                            draft.local_message_id,
                            draft.mirror_conversation_id,
                            draft.mirror_message_id,
                            draft.direction.to_string(),
                            draft.echo_token,
                            draft.source_token,
                            extensions,
                            now,
                        ],
                    )?;
                    tx.last_insert_rowid()
                }
            };

            apply_status(&tx, id, draft.status, failure.as_ref(), &now)?;
            let row = load_relation(&tx, id)?;
            tx.commit()?;
            Ok(row)
        })
        .await
        .map_err(map_tr_err)?;

    row.ok_or_else(|| MirrorgateError::Internal("upserted relation vanished".to_string()))?
        .decode()
}

/// Narrow status write used by the engine and the retry path.
///
/// The store does not police the state machine: concurrent writers resolve
/// last-write-wins, carrying the failure detail of the latest attempt.
pub async fn update_status(
    db: &Database,
    id: i64,
    status: SyncStatus,
    failure: Option<&RelationFailure>,
) -> Result<SyncRelation, MirrorgateError> {
    let failure = failure.map(FailureColumns::from);
    let row = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            if apply_status(&tx, id, status, failure.as_ref(), &now_ts())? == 0 {
                return Ok(None);
            }
            let row = load_relation(&tx, id)?;
            tx.commit()?;
            Ok(row)
        })
        .await
        .map_err(map_tr_err)?;
    row.ok_or_else(|| not_found(id))?.decode()
}

/// Failed relations of a session, oldest first.
pub async fn list_failed(
    db: &Database,
    session_id: &str,
    limit: u32,
) -> Result<Vec<SyncRelation>, MirrorgateError> {
    let session_id = session_id.to_string();
    let rows = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM sync_relations
                 WHERE session_id = ?1 AND status = 'failed'
                 ORDER BY updated_at ASC, id ASC
                 LIMIT ?2",
                RelationRow::COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![session_id, limit], RelationRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)?;
    decode_all(rows, RelationRow::decode)
}

/// Relations the retry sweep should pick up, across all sessions.
///
/// That is transient failures whose `next_retry_at` has passed, plus pending
/// relations untouched since `stale_before` (an attempt that never finished).
pub async fn list_due(
    db: &Database,
    now: DateTime<Utc>,
    stale_before: DateTime<Utc>,
    limit: u32,
) -> Result<Vec<SyncRelation>, MirrorgateError> {
    let now = format_ts(now);
    let stale_before = format_ts(stale_before);
    let rows = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM sync_relations
                 WHERE (status = 'failed' AND failure_kind = 'transient'
                        AND next_retry_at IS NOT NULL AND next_retry_at <= ?1)
                    OR (status = 'pending' AND updated_at <= ?2)
                 ORDER BY COALESCE(next_retry_at, updated_at) ASC, id ASC
                 LIMIT ?3",
                RelationRow::COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![now, stale_before, limit], RelationRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)?;
    decode_all(rows, RelationRow::decode)
}

/// Administrative purge of one relation. Returns `false` if it did not exist.
pub async fn purge_relation(db: &Database, id: i64) -> Result<bool, MirrorgateError> {
    let deleted = db
        .connection()
        .call(move |conn| conn.execute("DELETE FROM sync_relations WHERE id = ?1", params![id]))
        .await
        .map_err(map_tr_err)?;
    Ok(deleted > 0)
}

pub async fn count_by_status(
    db: &Database,
    session_id: &str,
) -> Result<RelationCounts, MirrorgateError> {
    let session_id = session_id.to_string();
    let counts = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM sync_relations WHERE session_id = ?1 GROUP BY status",
            )?;
            let rows = stmt
                .query_map(params![session_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)?;

    let mut result = RelationCounts::default();
    for (status, count) in counts {
        let count = count as u64;
        match status.parse::<SyncStatus>() {
            Ok(SyncStatus::Pending) => result.pending = count,
            Ok(SyncStatus::Synced) => result.synced = count,
            Ok(SyncStatus::Failed) => result.failed = count,
            Err(_) => {
                return Err(MirrorgateError::Decode {
                    entity: "relation",
                    detail: format!("status: unknown value `{status}`"),
                });
            }
        }
    }
    Ok(result)
}
