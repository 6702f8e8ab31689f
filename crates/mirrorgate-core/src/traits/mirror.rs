// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client for the mirror system (the helpdesk/inbox messages are relayed into).

use async_trait::async_trait;

use crate::error::MirrorgateError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{MirrorCreate, MirrorMessageRef, MirrorUpdate};

/// Outbound half of the mirror-system integration.
///
/// Errors should be [`MirrorgateError::Mirror`] with a
/// [`FailureKind`](crate::error::FailureKind) so the bridge can decide
/// whether to retry.
#[async_trait]
pub trait MirrorClient: PluginAdapter {
    /// Creates a mirrored message and returns its identity.
    async fn create_message(&self, req: MirrorCreate) -> Result<MirrorMessageRef, MirrorgateError>;

    /// Updates an existing mirrored message in place.
    async fn update_message(&self, req: MirrorUpdate) -> Result<(), MirrorgateError>;
}
