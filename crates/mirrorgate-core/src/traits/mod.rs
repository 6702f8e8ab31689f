// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the bridge's collaborators.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod mirror;
pub mod notifier;
pub mod policy;
pub mod session;
pub mod storage;

pub use adapter::PluginAdapter;
pub use mirror::MirrorClient;
pub use notifier::Notifier;
pub use policy::PolicyStore;
pub use session::SessionSender;
pub use storage::{ChatStore, MessageStore, RelationStore, StorageAdapter};
