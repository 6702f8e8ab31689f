// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for the chat, message and relation tables.

pub mod chats;
pub mod messages;
pub mod relations;
