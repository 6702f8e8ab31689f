// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only access to per-session bridge settings.

use async_trait::async_trait;

use crate::error::MirrorgateError;
use crate::types::BridgePolicy;

/// Resolves the [`BridgePolicy`] in effect for a session.
#[async_trait]
pub trait PolicyStore: Send + Sync + 'static {
    async fn policy(&self, session_id: &str) -> Result<BridgePolicy, MirrorgateError>;
}
