// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP surface of the Mirrorgate bridge.
//!
//! Inbound: an axum server accepting device and mirror-system events and
//! exposing operator views. Outbound: reqwest adapters for the mirror
//! system, the device send primitive, and webhook notifications.

pub mod auth;
pub mod handlers;
pub mod http;
pub mod mirror_client;
pub mod server;
pub mod session_sender;
pub mod webhook;

pub use mirror_client::HttpMirrorClient;
pub use server::{build_router, start_server, GatewayState, HealthState, ServerConfig};
pub use session_sender::HttpSessionSender;
pub use webhook::WebhookNotifier;
