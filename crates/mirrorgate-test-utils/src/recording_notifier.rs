// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notifier that records every notification for later assertions.

use std::sync::Mutex;

use mirrorgate_core::types::Notification;
use mirrorgate_core::Notifier;

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Notification> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Event names in arrival order, e.g. `relation.synced`.
    pub fn event_names(&self) -> Vec<&'static str> {
        self.events()
            .iter()
            .map(|n| match n {
                Notification::ChatUpserted { .. } => "chat.upserted",
                Notification::ChatDeleted { .. } => "chat.deleted",
                Notification::MessageUpserted { .. } => "message.upserted",
                Notification::MessageDeleted { .. } => "message.deleted",
                Notification::RelationSynced { .. } => "relation.synced",
                Notification::RelationFailed { .. } => "relation.failed",
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification);
    }
}
