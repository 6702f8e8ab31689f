// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One ordered worker per session.
//!
//! Each session gets a bounded queue and a single task draining it, so
//! events of one session are reconciled strictly in arrival order while
//! different sessions proceed in parallel. Sweeper and operator retries are
//! queued on the same worker as the live events of their session.

use std::collections::HashMap;
use std::sync::Arc;

use mirrorgate_core::types::{LocalMessageEvent, MirrorMessageEvent};
use mirrorgate_core::{MirrorgateError, RelationStore};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{LocalOutcome, MirrorOutcome, ReconciliationEngine, RetryOutcome};
use crate::metrics;

/// Reply channel of a queued retry.
pub type RetryReply = oneshot::Sender<Result<RetryOutcome, MirrorgateError>>;

/// An event queued for reconciliation.
#[derive(Debug)]
pub enum BridgeEvent {
    Local(LocalMessageEvent),
    Mirror(MirrorMessageEvent),
    /// Re-attempt one relation of the session and report the outcome.
    Retry {
        session_id: String,
        relation_id: i64,
        reply: RetryReply,
    },
}

impl BridgeEvent {
    pub fn session_id(&self) -> &str {
        match self {
            BridgeEvent::Local(event) => &event.session_id,
            BridgeEvent::Mirror(event) => &event.session_id,
            BridgeEvent::Retry { session_id, .. } => session_id,
        }
    }
}

struct Worker {
    tx: mpsc::Sender<BridgeEvent>,
    handle: JoinHandle<()>,
}

/// Registry of per-session workers, created lazily on first event.
pub struct SessionWorkers {
    engine: Arc<ReconciliationEngine>,
    capacity: usize,
    cancel: CancellationToken,
    workers: Mutex<HashMap<String, Worker>>,
}

impl SessionWorkers {
    pub fn new(engine: Arc<ReconciliationEngine>, capacity: usize, cancel: CancellationToken) -> Self {
        Self {
            engine,
            capacity: capacity.max(1),
            cancel,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Queue an event on its session's worker. Waits while the queue is full.
    pub async fn dispatch(&self, event: BridgeEvent) -> Result<(), MirrorgateError> {
        if self.cancel.is_cancelled() {
            return Err(MirrorgateError::Cancelled);
        }
        let tx = {
            let mut workers = self.workers.lock().await;
            let session_id = event.session_id().to_string();
            let live = workers
                .get(&session_id)
                .filter(|w| !w.tx.is_closed())
                .map(|w| w.tx.clone());
            match live {
                Some(tx) => tx,
                None => {
                    let worker = self.spawn_worker(session_id.clone());
                    let tx = worker.tx.clone();
                    workers.insert(session_id, worker);
                    metrics::set_session_workers(workers.len());
                    tx
                }
            }
        };
        tx.send(event).await.map_err(|_| MirrorgateError::Cancelled)
    }

    pub fn engine(&self) -> &Arc<ReconciliationEngine> {
        &self.engine
    }

    /// Queue a retry behind the session's pending events. The receiver
    /// yields the outcome, or closes if the worker stops first.
    pub async fn queue_retry(
        &self,
        session_id: &str,
        relation_id: i64,
    ) -> Result<oneshot::Receiver<Result<RetryOutcome, MirrorgateError>>, MirrorgateError> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(BridgeEvent::Retry {
            session_id: session_id.to_string(),
            relation_id,
            reply,
        })
        .await?;
        Ok(rx)
    }

    /// Retry one relation on its session's worker and wait for the outcome.
    pub async fn retry_by_id(&self, relation_id: i64) -> Result<RetryOutcome, MirrorgateError> {
        let relation = self
            .engine
            .storage()
            .get_relation(relation_id)
            .await?
            .ok_or_else(|| MirrorgateError::NotFound {
                entity: "relation",
                key: relation_id.to_string(),
            })?;
        let rx = self.queue_retry(&relation.session_id, relation.id).await?;
        rx.await.map_err(|_| MirrorgateError::Cancelled)?
    }

    /// Number of sessions with a worker.
    pub async fn session_count(&self) -> usize {
        self.workers.lock().await.len()
    }

    /// Wait for every worker to stop. Call after cancelling the token.
    pub async fn join(&self) {
        let workers: Vec<(String, Worker)> = self.workers.lock().await.drain().collect();
        for (session_id, worker) in workers {
            drop(worker.tx);
            if let Err(e) = worker.handle.await {
                warn!(session = %session_id, error = %e, "session worker panicked");
            }
        }
        metrics::set_session_workers(0);
    }

    fn spawn_worker(&self, session_id: String) -> Worker {
        let (tx, mut rx) = mpsc::channel::<BridgeEvent>(self.capacity);
        let engine = Arc::clone(&self.engine);
        let cancel = self.cancel.clone();
        info!(session = %session_id, "session worker started");

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(session = %session_id, "session worker cancelled");
                        break;
                    }
                    next = rx.recv() => match next {
                        Some(event) => process(&engine, event).await,
                        None => break,
                    }
                }
            }
            info!(session = %session_id, "session worker stopped");
        });

        Worker { tx, handle }
    }
}

async fn process(engine: &ReconciliationEngine, event: BridgeEvent) {
    match event {
        BridgeEvent::Local(event) => {
            let session_id = event.session_id.clone();
            let remote_id = event.remote_message_id.clone();
            match engine.handle_local(event).await {
                Ok(outcome) => log_local(&session_id, &remote_id, &outcome),
                Err(e) => warn!(
                    session = %session_id,
                    remote_id = %remote_id,
                    error = %e,
                    "local event rejected"
                ),
            }
        }
        BridgeEvent::Mirror(event) => {
            let session_id = event.session_id.clone();
            let mirror_message_id = event.mirror_message_id.clone();
            match engine.handle_mirror(event).await {
                Ok(outcome) => log_mirror(&session_id, &mirror_message_id, &outcome),
                Err(e) => warn!(
                    session = %session_id,
                    mirror_message_id = %mirror_message_id,
                    error = %e,
                    "mirror event rejected"
                ),
            }
        }
        BridgeEvent::Retry {
            session_id,
            relation_id,
            reply,
        } => {
            let result = engine.retry_by_id(relation_id).await;
            match &result {
                Ok(outcome) => log_retry(&session_id, relation_id, outcome),
                Err(e) => warn!(
                    session = %session_id,
                    relation_id,
                    error = %e,
                    "retry rejected"
                ),
            }
            if reply.send(result).is_err() {
                debug!(relation_id, "retry requester went away");
            }
        }
    }
}

fn log_retry(session_id: &str, relation_id: i64, outcome: &RetryOutcome) {
    let result = match outcome {
        RetryOutcome::Synced(_) => "synced",
        RetryOutcome::Failed { .. } => "failed",
        RetryOutcome::Skipped { .. } => "skipped",
    };
    debug!(session = %session_id, relation_id, result, "retry processed");
}

fn log_local(session_id: &str, remote_id: &str, outcome: &LocalOutcome) {
    let result = match outcome {
        LocalOutcome::Disabled { .. } => "disabled",
        LocalOutcome::Excluded { .. } => "excluded",
        LocalOutcome::OutsideImportWindow { .. } => "outside_import_window",
        LocalOutcome::DeletedBeforeSync { .. } => "deleted_before_sync",
        LocalOutcome::Echo { .. } => "echo",
        LocalOutcome::Unchanged { .. } => "unchanged",
        LocalOutcome::MirrorAuthoritative { .. } => "mirror_authoritative",
        LocalOutcome::Synced { .. } => "synced",
        LocalOutcome::Failed { .. } => "failed",
    };
    debug!(session = %session_id, remote_id = %remote_id, result, "local event processed");
}

fn log_mirror(session_id: &str, mirror_message_id: &str, outcome: &MirrorOutcome) {
    let result = match outcome {
        MirrorOutcome::Echo { .. } => "echo",
        MirrorOutcome::Duplicate { .. } => "duplicate",
        MirrorOutcome::Disabled => "disabled",
        MirrorOutcome::Excluded { .. } => "excluded",
        MirrorOutcome::Delivered { .. } => "delivered",
        MirrorOutcome::Failed { .. } => "failed",
    };
    debug!(
        session = %session_id,
        mirror_message_id = %mirror_message_id,
        result,
        "mirror event processed"
    );
}
