// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types and the decode boundary between SQLite rows and domain entities.
//!
//! Query closures read raw columns into `*Row` structs; `decode()` turns a row
//! into the typed entity or a [`MirrorgateError::Decode`] naming the bad column.
//! Nothing else reconstructs entities field by field.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use mirrorgate_core::types::MessageContent;
use mirrorgate_core::MirrorgateError;
use rusqlite::Row;

pub use mirrorgate_core::types::{Chat, Message, SyncRelation};

/// Fixed-width timestamp text. Lexical order equals chronological order.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn now_ts() -> String {
    format_ts(Utc::now())
}

fn parse_ts(
    entity: &'static str,
    column: &str,
    value: &str,
) -> Result<DateTime<Utc>, MirrorgateError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| MirrorgateError::Decode {
            entity,
            detail: format!("{column} `{value}`: {e}"),
        })
}

fn parse_opt_ts(
    entity: &'static str,
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, MirrorgateError> {
    value.map(|v| parse_ts(entity, column, &v)).transpose()
}

fn parse_enum<T: FromStr>(
    entity: &'static str,
    column: &str,
    value: &str,
) -> Result<T, MirrorgateError> {
    T::from_str(value).map_err(|_| MirrorgateError::Decode {
        entity,
        detail: format!("{column}: unknown value `{value}`"),
    })
}

fn parse_json<T: serde::de::DeserializeOwned>(
    entity: &'static str,
    column: &str,
    value: &str,
) -> Result<T, MirrorgateError> {
    serde_json::from_str(value).map_err(|e| MirrorgateError::Decode {
        entity,
        detail: format!("{column}: {e}"),
    })
}

fn parse_opt_json(
    entity: &'static str,
    column: &str,
    value: Option<String>,
) -> Result<Option<serde_json::Value>, MirrorgateError> {
    value.map(|v| parse_json(entity, column, &v)).transpose()
}

pub(crate) fn to_json(value: &impl serde::Serialize) -> Result<String, MirrorgateError> {
    serde_json::to_string(value).map_err(|e| MirrorgateError::Internal(format!("serialize: {e}")))
}

/// Raw `chats` row.
#[derive(Debug, Clone)]
pub struct ChatRow {
    pub id: i64,
    pub session_id: String,
    pub address: String,
    pub name: Option<String>,
    pub is_group: bool,
    pub last_activity_at: Option<String>,
    pub unread_count: i64,
    pub archived: bool,
    pub pinned: bool,
    pub muted: bool,
    pub metadata: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ChatRow {
    pub const COLUMNS: &'static str = "id, session_id, address, name, is_group, last_activity_at, \
        unread_count, archived, pinned, muted, metadata, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            address: row.get(2)?,
            name: row.get(3)?,
            is_group: row.get(4)?,
            last_activity_at: row.get(5)?,
            unread_count: row.get(6)?,
            archived: row.get(7)?,
            pinned: row.get(8)?,
            muted: row.get(9)?,
            metadata: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    pub fn decode(self) -> Result<Chat, MirrorgateError> {
        const E: &str = "chat";
        Ok(Chat {
            id: self.id,
            session_id: self.session_id,
            address: self.address,
            name: self.name,
            is_group: self.is_group,
            last_activity_at: parse_opt_ts(E, "last_activity_at", self.last_activity_at)?,
            unread_count: self.unread_count,
            archived: self.archived,
            pinned: self.pinned,
            muted: self.muted,
            metadata: parse_opt_json(E, "metadata", self.metadata)?,
            created_at: parse_ts(E, "created_at", &self.created_at)?,
            updated_at: parse_ts(E, "updated_at", &self.updated_at)?,
        })
    }
}

/// Raw `messages` row.
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub session_id: String,
    pub chat_id: i64,
    pub remote_id: String,
    pub direction: String,
    pub content_type: String,
    pub content: String,
    pub sender: Option<String>,
    pub quoted_remote_id: Option<String>,
    pub status: String,
    pub timestamp: String,
    pub edited_at: Option<String>,
    pub deleted_at: Option<String>,
    pub reaction: Option<String>,
    pub metadata: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl MessageRow {
    pub const COLUMNS: &'static str = "id, session_id, chat_id, remote_id, direction, content_type, \
        content, sender, quoted_remote_id, status, timestamp, edited_at, deleted_at, reaction, \
        metadata, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            chat_id: row.get(2)?,
            remote_id: row.get(3)?,
            direction: row.get(4)?,
            content_type: row.get(5)?,
            content: row.get(6)?,
            sender: row.get(7)?,
            quoted_remote_id: row.get(8)?,
            status: row.get(9)?,
            timestamp: row.get(10)?,
            edited_at: row.get(11)?,
            deleted_at: row.get(12)?,
            reaction: row.get(13)?,
            metadata: row.get(14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    }

    pub fn decode(self) -> Result<Message, MirrorgateError> {
        const E: &str = "message";
        let content: MessageContent = parse_json(E, "content", &self.content)?;
        let content_type = parse_enum(E, "content_type", &self.content_type)?;
        if content.content_type() != content_type {
            return Err(MirrorgateError::Decode {
                entity: E,
                detail: format!(
                    "content_type `{}` does not match payload `{}`",
                    self.content_type,
                    content.content_type()
                ),
            });
        }
        Ok(Message {
            id: self.id,
            session_id: self.session_id,
            chat_id: self.chat_id,
            remote_id: self.remote_id,
            direction: parse_enum(E, "direction", &self.direction)?,
            content,
            sender: self.sender,
            quoted_remote_id: self.quoted_remote_id,
            status: parse_enum(E, "status", &self.status)?,
            timestamp: parse_ts(E, "timestamp", &self.timestamp)?,
            edited_at: parse_opt_ts(E, "edited_at", self.edited_at)?,
            deleted_at: parse_opt_ts(E, "deleted_at", self.deleted_at)?,
            reaction: self.reaction,
            metadata: parse_opt_json(E, "metadata", self.metadata)?,
            created_at: parse_ts(E, "created_at", &self.created_at)?,
            updated_at: parse_ts(E, "updated_at", &self.updated_at)?,
        })
    }
}

/// Raw `sync_relations` row.
#[derive(Debug, Clone)]
pub struct RelationRow {
    pub id: i64,
    pub session_id: String,
    pub local_message_id: i64,
    pub mirror_conversation_id: Option<String>,
    pub mirror_message_id: Option<String>,
    pub direction: String,
    pub status: String,
    pub echo_token: Option<String>,
    pub source_token: Option<String>,
    pub last_error: Option<String>,
    pub failure_kind: Option<String>,
    pub retry_count: u32,
    pub next_retry_at: Option<String>,
    pub extensions: String,
    pub created_at: String,
    pub updated_at: String,
}

impl RelationRow {
    pub const COLUMNS: &'static str = "id, session_id, local_message_id, mirror_conversation_id, \
        mirror_message_id, direction, status, echo_token, source_token, last_error, failure_kind, \
        retry_count, next_retry_at, extensions, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            local_message_id: row.get(2)?,
            mirror_conversation_id: row.get(3)?,
            mirror_message_id: row.get(4)?,
            direction: row.get(5)?,
            status: row.get(6)?,
            echo_token: row.get(7)?,
            source_token: row.get(8)?,
            last_error: row.get(9)?,
            failure_kind: row.get(10)?,
            retry_count: row.get(11)?,
            next_retry_at: row.get(12)?,
            extensions: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    pub fn decode(self) -> Result<SyncRelation, MirrorgateError> {
        const E: &str = "relation";
        let extensions: BTreeMap<String, serde_json::Value> =
            parse_json(E, "extensions", &self.extensions)?;
        Ok(SyncRelation {
            id: self.id,
            session_id: self.session_id,
            local_message_id: self.local_message_id,
            mirror_conversation_id: self.mirror_conversation_id,
            mirror_message_id: self.mirror_message_id,
            direction: parse_enum(E, "direction", &self.direction)?,
            status: parse_enum(E, "status", &self.status)?,
            echo_token: self.echo_token,
            source_token: self.source_token,
            last_error: self.last_error,
            failure_kind: self
                .failure_kind
                .map(|k| parse_enum(E, "failure_kind", &k))
                .transpose()?,
            retry_count: self.retry_count,
            next_retry_at: parse_opt_ts(E, "next_retry_at", self.next_retry_at)?,
            extensions,
            created_at: parse_ts(E, "created_at", &self.created_at)?,
            updated_at: parse_ts(E, "updated_at", &self.updated_at)?,
        })
    }
}

/// Decode every row, failing on the first malformed one.
pub(crate) fn decode_all<R, T>(
    rows: Vec<R>,
    decode: impl Fn(R) -> Result<T, MirrorgateError>,
) -> Result<Vec<T>, MirrorgateError> {
    rows.into_iter().map(decode).collect()
}
