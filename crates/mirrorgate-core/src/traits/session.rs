// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Send primitive of the session/device layer.

use async_trait::async_trait;

use crate::error::MirrorgateError;
use crate::traits::adapter::PluginAdapter;
use crate::types::SessionSend;

/// Delivers content through a connected session.
#[async_trait]
pub trait SessionSender: PluginAdapter {
    /// Sends the content and returns the platform-assigned remote message id.
    async fn send(&self, req: SessionSend) -> Result<String, MirrorgateError>;
}
