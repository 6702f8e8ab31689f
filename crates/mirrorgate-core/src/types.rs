// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across adapter traits and the bridge.
//!
//! Every entity is scoped to a session identifier. Status and direction
//! fields are closed enums; storage encodes them as their `Display` text and
//! decodes them back through `FromStr`.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{FailureKind, MirrorgateError};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Mirror,
    Session,
    Notifier,
}

// --- Enumerations ---

/// Who authored a message, from the connected account's point of view.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    FromMe,
    FromOther,
}

/// Coarse content classification stored alongside the payload.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Media,
    System,
}

/// Delivery status reported by the messaging platform.
///
/// Statuses only move forward; see [`DeliveryStatus::advance`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Read,
}

impl DeliveryStatus {
    fn rank(self) -> u8 {
        match self {
            DeliveryStatus::Pending => 0,
            DeliveryStatus::Sent => 1,
            DeliveryStatus::Delivered => 2,
            DeliveryStatus::Read => 3,
        }
    }

    /// Returns the later of the two statuses. Receipts can arrive out of order.
    pub fn advance(self, incoming: DeliveryStatus) -> DeliveryStatus {
        if incoming.rank() > self.rank() {
            incoming
        } else {
            self
        }
    }
}

/// Lifecycle state of a [`SyncRelation`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

impl SyncStatus {
    /// Whether `self -> next` is an edge of the sync state machine.
    ///
    /// Re-entering the same state is allowed so repeated attempts and
    /// duplicate deliveries stay idempotent.
    pub fn can_transition_to(self, next: SyncStatus) -> bool {
        match (self, next) {
            (SyncStatus::Pending, _) => true,
            (SyncStatus::Failed, SyncStatus::Pending | SyncStatus::Failed) => true,
            (SyncStatus::Failed, SyncStatus::Synced) => false,
            (SyncStatus::Synced, SyncStatus::Pending | SyncStatus::Synced) => true,
            (SyncStatus::Synced, SyncStatus::Failed) => false,
        }
    }
}

/// Which side originated the content a relation tracks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RelationDirection {
    OutboundToMirror,
    InboundFromMirror,
}

/// Which side wins when both have edited the same message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    /// Platform edits are pushed to the mirror.
    #[default]
    Platform,
    /// The mirror copy is authoritative; platform edits are not re-sent.
    Mirror,
}

// --- Paging ---

/// Offset pagination for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

/// Inclusive timestamp bounds for message listings. `None` is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

// --- Chat ---

/// A conversation within a session, keyed by `(session_id, address)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub session_id: String,
    pub address: String,
    pub name: Option<String>,
    pub is_group: bool,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub unread_count: i64,
    pub archived: bool,
    pub pinned: bool,
    pub muted: bool,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Client-suppliable chat attributes. `None` leaves the stored value alone.
///
/// Unread counters and activity timestamps are deliberately absent: only the
/// message ingestion path maintains them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_group: Option<bool>,
    #[serde(default)]
    pub archived: Option<bool>,
    #[serde(default)]
    pub pinned: Option<bool>,
    #[serde(default)]
    pub muted: Option<bool>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

// --- Message ---

/// Pointer to a media blob held outside the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPayload {
    pub url: String,
    pub mime_type: String,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

/// Message payload. The variant determines the stored [`ContentType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { body: String },
    Media(MediaPayload),
    System { body: String },
}

impl MessageContent {
    pub fn text(body: impl Into<String>) -> Self {
        MessageContent::Text { body: body.into() }
    }

    pub fn content_type(&self) -> ContentType {
        match self {
            MessageContent::Text { .. } => ContentType::Text,
            MessageContent::Media(_) => ContentType::Media,
            MessageContent::System { .. } => ContentType::System,
        }
    }

    /// Human-readable text of the payload, if any.
    pub fn body(&self) -> Option<&str> {
        match self {
            MessageContent::Text { body } | MessageContent::System { body } => Some(body),
            MessageContent::Media(media) => media.caption.as_deref(),
        }
    }
}

/// A stored message, keyed by `(session_id, remote_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub session_id: String,
    pub chat_id: i64,
    pub remote_id: String,
    pub direction: Direction,
    pub content: MessageContent,
    pub sender: Option<String>,
    pub quoted_remote_id: Option<String>,
    pub status: DeliveryStatus,
    pub timestamp: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub reaction: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// An observed message to be upserted into the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub session_id: String,
    pub chat_address: String,
    pub remote_id: String,
    pub direction: Direction,
    pub content: MessageContent,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub quoted_remote_id: Option<String>,
    pub status: DeliveryStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub reaction: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    /// Chat attributes observed together with the message (name, group flag).
    #[serde(default)]
    pub chat: ChatPatch,
}

impl NewMessage {
    /// Rejects messages that must never reach the store.
    pub fn validate(&self) -> Result<(), MirrorgateError> {
        require_id("session_id", &self.session_id)?;
        require_id("chat_address", &self.chat_address)?;
        require_id("remote_id", &self.remote_id)?;
        if let MessageContent::Media(media) = &self.content {
            require_id("media.url", &media.url)?;
            require_id("media.mime_type", &media.mime_type)?;
        }
        Ok(())
    }
}

/// Result of [`MessageStore::upsert_message`](crate::traits::MessageStore::upsert_message).
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    /// The canonical row after the write.
    pub message: Message,
    /// True when this call inserted the row.
    pub created: bool,
    /// True when an existing row's content was edited by this call.
    pub content_changed: bool,
    /// True when this call soft-deleted a previously live row.
    pub newly_deleted: bool,
}

// --- Sync relation ---

/// Failure detail recorded on a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationFailure {
    pub kind: FailureKind,
    pub detail: String,
    /// When the retry sweep may pick the relation up again. `None` means never.
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// Mapping between one local message and at most one mirror-system message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRelation {
    pub id: i64,
    pub session_id: String,
    pub local_message_id: i64,
    pub mirror_conversation_id: Option<String>,
    pub mirror_message_id: Option<String>,
    pub direction: RelationDirection,
    pub status: SyncStatus,
    pub echo_token: Option<String>,
    pub source_token: Option<String>,
    pub last_error: Option<String>,
    pub failure_kind: Option<FailureKind>,
    pub retry_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Mirror-implementation specific extras.
    pub extensions: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncRelation {
    /// The mirror-side identity, once both halves are known.
    pub fn mirror_ref(&self) -> Option<MirrorMessageRef> {
        match (&self.mirror_conversation_id, &self.mirror_message_id) {
            (Some(conversation_id), Some(message_id)) => Some(MirrorMessageRef {
                conversation_id: conversation_id.clone(),
                message_id: message_id.clone(),
            }),
            _ => None,
        }
    }
}

/// Input to [`RelationStore::create_or_update`](crate::traits::RelationStore::create_or_update).
///
/// The natural key depends on `direction`: outbound relations are keyed by
/// `local_message_id`, inbound relations by the mirror identifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDraft {
    pub session_id: String,
    pub local_message_id: i64,
    pub mirror_conversation_id: Option<String>,
    pub mirror_message_id: Option<String>,
    pub direction: RelationDirection,
    pub status: SyncStatus,
    pub echo_token: Option<String>,
    pub source_token: Option<String>,
    pub failure: Option<RelationFailure>,
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl RelationDraft {
    pub fn outbound(session_id: impl Into<String>, local_message_id: i64) -> Self {
        Self {
            session_id: session_id.into(),
            local_message_id,
            mirror_conversation_id: None,
            mirror_message_id: None,
            direction: RelationDirection::OutboundToMirror,
            status: SyncStatus::Pending,
            echo_token: None,
            source_token: None,
            failure: None,
            extensions: BTreeMap::new(),
        }
    }

    pub fn inbound(
        session_id: impl Into<String>,
        local_message_id: i64,
        mirror: MirrorMessageRef,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            local_message_id,
            mirror_conversation_id: Some(mirror.conversation_id),
            mirror_message_id: Some(mirror.message_id),
            direction: RelationDirection::InboundFromMirror,
            status: SyncStatus::Synced,
            echo_token: None,
            source_token: None,
            failure: None,
            extensions: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<(), MirrorgateError> {
        require_id("session_id", &self.session_id)?;
        if self.direction == RelationDirection::InboundFromMirror
            && (self.mirror_conversation_id.is_none() || self.mirror_message_id.is_none())
        {
            return Err(MirrorgateError::Validation(
                "inbound relations require both mirror identifiers".to_string(),
            ));
        }
        Ok(())
    }
}

/// Relation counts per status for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelationCounts {
    pub pending: u64,
    pub synced: u64,
    pub failed: u64,
}

// --- Bridge policy ---

/// Per-session bridge settings, resolved by a [`PolicyStore`](crate::traits::PolicyStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgePolicy {
    pub enabled: bool,
    pub excluded_chats: Vec<String>,
    pub auto_create_chat: bool,
    /// How far back historical messages are mirrored. 0 disables import.
    pub import_window_days: u32,
    pub authoritative: Authority,
}

impl Default for BridgePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            excluded_chats: Vec::new(),
            auto_create_chat: true,
            import_window_days: 0,
            authoritative: Authority::Platform,
        }
    }
}

impl BridgePolicy {
    pub fn is_excluded(&self, chat_address: &str) -> bool {
        self.excluded_chats.iter().any(|c| c == chat_address)
    }

    /// Whether a historical message sent at `timestamp` falls inside the import window.
    pub fn within_import_window(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if self.import_window_days == 0 {
            return false;
        }
        timestamp >= now - Duration::days(i64::from(self.import_window_days))
    }
}

// --- External events and payloads ---

/// A message notification from the session/device layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalMessageEvent {
    pub session_id: String,
    pub remote_message_id: String,
    pub chat_address: String,
    #[serde(default)]
    pub chat_name: Option<String>,
    #[serde(default)]
    pub is_group: Option<bool>,
    pub direction: Direction,
    pub content: MessageContent,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub quoted_remote_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: DeliveryStatus,
    /// Set for messages replayed from history rather than observed live.
    #[serde(default)]
    pub historical: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub reaction: Option<String>,
}

impl LocalMessageEvent {
    pub fn into_new_message(self) -> NewMessage {
        NewMessage {
            session_id: self.session_id,
            chat_address: self.chat_address,
            remote_id: self.remote_message_id,
            direction: self.direction,
            content: self.content,
            sender: self.sender,
            quoted_remote_id: self.quoted_remote_id,
            status: self.status,
            timestamp: self.timestamp,
            deleted: self.deleted,
            reaction: self.reaction,
            metadata: None,
            chat: ChatPatch {
                name: self.chat_name,
                is_group: self.is_group,
                ..ChatPatch::default()
            },
        }
    }
}

/// A message notification from the mirror system's own event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorMessageEvent {
    pub session_id: String,
    pub conversation_id: String,
    pub mirror_message_id: String,
    pub content: MessageContent,
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Target chat, when the mirror system knows it.
    #[serde(default)]
    pub chat_address: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl MirrorMessageEvent {
    pub fn mirror_ref(&self) -> MirrorMessageRef {
        MirrorMessageRef {
            conversation_id: self.conversation_id.clone(),
            message_id: self.mirror_message_id.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), MirrorgateError> {
        require_id("session_id", &self.session_id)?;
        require_id("conversation_id", &self.conversation_id)?;
        require_id("mirror_message_id", &self.mirror_message_id)
    }
}

/// Identity of a message inside the mirror system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MirrorMessageRef {
    pub conversation_id: String,
    pub message_id: String,
}

/// Loop-guard markers attached to every message relayed into the mirror.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_token: Option<String>,
}

impl MirrorMetadata {
    /// Extracts the markers from an arbitrary mirror metadata object.
    ///
    /// Unknown keys are ignored; non-string values are treated as absent.
    pub fn from_value(value: &serde_json::Value) -> Self {
        let get = |key: &str| {
            value
                .get(key)
                .and_then(serde_json::Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            echo_token: get("echo_token"),
            source_token: get("source_token"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.echo_token.is_none() && self.source_token.is_none()
    }
}

/// Request to create a message in the mirror system.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorCreate {
    pub session_id: String,
    pub conversation_ref: String,
    pub chat_address: String,
    pub direction: Direction,
    pub content: MessageContent,
    pub metadata: MirrorMetadata,
}

/// Request to update an existing mirror-system message in place.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorUpdate {
    pub target: MirrorMessageRef,
    pub content: MessageContent,
    pub deleted: bool,
    pub metadata: MirrorMetadata,
}

/// Request for the session layer's send primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSend {
    pub session_id: String,
    pub chat_address: String,
    pub content: MessageContent,
    pub quoted_remote_id: Option<String>,
}

/// Fire-and-forget notifications for webhook consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum Notification {
    #[serde(rename = "chat.upserted")]
    ChatUpserted { chat: Chat },
    #[serde(rename = "chat.deleted")]
    ChatDeleted { session_id: String, address: String },
    #[serde(rename = "message.upserted")]
    MessageUpserted { message: Message },
    #[serde(rename = "message.deleted")]
    MessageDeleted { message: Message },
    #[serde(rename = "relation.synced")]
    RelationSynced { relation: SyncRelation },
    #[serde(rename = "relation.failed")]
    RelationFailed { relation: SyncRelation },
}

impl Notification {
    pub fn session_id(&self) -> &str {
        match self {
            Notification::ChatUpserted { chat } => &chat.session_id,
            Notification::ChatDeleted { session_id, .. } => session_id,
            Notification::MessageUpserted { message } | Notification::MessageDeleted { message } => {
                &message.session_id
            }
            Notification::RelationSynced { relation } | Notification::RelationFailed { relation } => {
                &relation.session_id
            }
        }
    }
}

fn require_id(field: &str, value: &str) -> Result<(), MirrorgateError> {
    if value.trim().is_empty() {
        return Err(MirrorgateError::Validation(format!("{field} must not be empty")));
    }
    if value.chars().any(char::is_control) {
        return Err(MirrorgateError::Validation(format!(
            "{field} must not contain control characters"
        )));
    }
    Ok(())
}
