// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Mirrorgate integration tests.
//!
//! Provides mock collaborators and a harness wiring them to a real
//! temp-SQLite store, so bridge behavior can be exercised without any
//! external service.
//!
//! # Components
//!
//! - [`MockMirror`] - Mirror client with scripted failures and captured calls
//! - [`MockSession`] - Session send primitive with captured sends
//! - [`RecordingNotifier`] - Notifier that keeps every notification
//! - [`TestHarness`] - Engine over a temp database with the mocks above

pub mod fixtures;
pub mod harness;
pub mod mock_mirror;
pub mod mock_session;
pub mod recording_notifier;

pub use harness::TestHarness;
pub use mock_mirror::MockMirror;
pub use mock_session::MockSession;
pub use recording_notifier::RecordingNotifier;
