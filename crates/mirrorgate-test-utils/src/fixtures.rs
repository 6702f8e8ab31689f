// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event builders for tests.

use chrono::{DateTime, Utc};
use mirrorgate_core::types::{
    DeliveryStatus, Direction, LocalMessageEvent, MessageContent, MirrorMessageEvent,
};

/// A live inbound text message from a contact.
pub fn local_text(session_id: &str, chat: &str, remote_id: &str, body: &str) -> LocalMessageEvent {
    LocalMessageEvent {
        session_id: session_id.to_string(),
        remote_message_id: remote_id.to_string(),
        chat_address: chat.to_string(),
        chat_name: None,
        is_group: None,
        direction: Direction::FromOther,
        content: MessageContent::text(body),
        sender: Some(chat.to_string()),
        quoted_remote_id: None,
        timestamp: Utc::now(),
        status: DeliveryStatus::Delivered,
        historical: false,
        deleted: false,
        reaction: None,
    }
}

/// A message replayed from history.
pub fn historical_text(
    session_id: &str,
    chat: &str,
    remote_id: &str,
    body: &str,
    timestamp: DateTime<Utc>,
) -> LocalMessageEvent {
    LocalMessageEvent {
        historical: true,
        timestamp,
        ..local_text(session_id, chat, remote_id, body)
    }
}

/// A reply typed in the mirror system.
pub fn mirror_text(
    session_id: &str,
    conversation: &str,
    message_id: &str,
    body: &str,
    metadata: serde_json::Value,
) -> MirrorMessageEvent {
    MirrorMessageEvent {
        session_id: session_id.to_string(),
        conversation_id: conversation.to_string(),
        mirror_message_id: message_id.to_string(),
        content: MessageContent::text(body),
        metadata,
        chat_address: None,
        timestamp: Some(Utc::now()),
    }
}
