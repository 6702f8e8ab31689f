// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fire-and-forget notification sink.

use crate::types::Notification;

/// Receives chat/message/relation mutation notifications.
///
/// Implementations must not block and must not report failure to the
/// caller: a failed delivery never rolls back the write that triggered it.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notification: Notification);
}

/// A notifier that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _notification: Notification) {}
}
