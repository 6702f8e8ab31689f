// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock session send primitive.
//!
//! Sends are captured and answered with remote ids `sent-{n}`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use mirrorgate_core::types::{AdapterType, HealthStatus, SessionSend};
use mirrorgate_core::{MirrorgateError, PluginAdapter, SessionSender};

/// A mock session layer.
pub struct MockSession {
    next_id: AtomicU64,
    sent: Mutex<Vec<(SessionSend, String)>>,
    failures: Mutex<VecDeque<MirrorgateError>>,
}

impl MockSession {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sent: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Fail the next send with `error`.
    pub async fn fail_next(&self, error: MirrorgateError) {
        self.failures.lock().await.push_back(error);
    }

    /// Every accepted send with the remote id it was given.
    pub async fn sent(&self) -> Vec<(SessionSend, String)> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockSession {
    fn name(&self) -> &str {
        "mock-session"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Session
    }

    async fn health_check(&self) -> Result<HealthStatus, MirrorgateError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MirrorgateError> {
        Ok(())
    }
}

#[async_trait]
impl SessionSender for MockSession {
    async fn send(&self, req: SessionSend) -> Result<String, MirrorgateError> {
        if let Some(error) = self.failures.lock().await.pop_front() {
            return Err(error);
        }
        let remote_id = format!("sent-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.sent.lock().await.push((req, remote_id.clone()));
        Ok(remote_id)
    }
}
