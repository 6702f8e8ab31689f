// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock mirror-system client for deterministic testing.
//!
//! Created messages get sequential ids `cw-{n}` starting at 55. Failures can
//! be scripted ahead of time and are consumed one per call.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use mirrorgate_core::types::{
    AdapterType, HealthStatus, MirrorCreate, MirrorMessageRef, MirrorUpdate,
};
use mirrorgate_core::{MirrorClient, MirrorgateError, PluginAdapter};

/// A mock mirror system.
pub struct MockMirror {
    next_id: AtomicU64,
    created: Mutex<Vec<(MirrorCreate, MirrorMessageRef)>>,
    updated: Mutex<Vec<MirrorUpdate>>,
    failures: Mutex<VecDeque<MirrorgateError>>,
    latency: Option<Duration>,
}

impl MockMirror {
    pub fn new() -> Self {
        Self::starting_at(55)
    }

    /// Mirror ids start at `cw-{first}`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next_id: AtomicU64::new(first),
            created: Mutex::new(Vec::new()),
            updated: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            latency: None,
        }
    }

    /// Delay every call, to widen race windows in concurrency tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next call with `error`.
    pub async fn fail_next(&self, error: MirrorgateError) {
        self.failures.lock().await.push_back(error);
    }

    /// Fail the next `n` calls with transient errors.
    pub async fn fail_transient(&self, n: usize) {
        let mut failures = self.failures.lock().await;
        for i in 0..n {
            failures.push_back(MirrorgateError::mirror_transient(format!(
                "503 service unavailable ({})",
                i + 1
            )));
        }
    }

    pub async fn created(&self) -> Vec<(MirrorCreate, MirrorMessageRef)> {
        self.created.lock().await.clone()
    }

    pub async fn updated(&self) -> Vec<MirrorUpdate> {
        self.updated.lock().await.clone()
    }

    pub async fn create_count(&self) -> usize {
        self.created.lock().await.len()
    }

    async fn before_call(&self) -> Result<(), MirrorgateError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.failures.lock().await.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Default for MockMirror {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockMirror {
    fn name(&self) -> &str {
        "mock-mirror"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Mirror
    }

    async fn health_check(&self) -> Result<HealthStatus, MirrorgateError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MirrorgateError> {
        Ok(())
    }
}

#[async_trait]
impl MirrorClient for MockMirror {
    async fn create_message(&self, req: MirrorCreate) -> Result<MirrorMessageRef, MirrorgateError> {
        self.before_call().await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mirror_ref = MirrorMessageRef {
            conversation_id: req.conversation_ref.clone(),
            message_id: format!("cw-{id}"),
        };
        self.created.lock().await.push((req, mirror_ref.clone()));
        Ok(mirror_ref)
    }

    async fn update_message(&self, req: MirrorUpdate) -> Result<(), MirrorgateError> {
        self.before_call().await?;
        self.updated.lock().await.push(req);
        Ok(())
    }
}
