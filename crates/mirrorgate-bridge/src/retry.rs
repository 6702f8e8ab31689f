// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded retry for failed relations.
//!
//! [`RetryPolicy`] decides when a failed attempt may run again;
//! [`RetrySweeper`] periodically loads due relations and queues them on the
//! [`SessionWorkers`], behind the live events of their session.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mirrorgate_config::model::RetryConfig;
use mirrorgate_core::{FailureKind, MirrorgateError, RelationStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::RetryOutcome;
use crate::worker::SessionWorkers;

/// Exponential backoff with a ceiling on attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_secs(config.base_delay_secs),
            max_delay: Duration::from_secs(config.max_delay_secs),
        }
    }

    /// Delay before attempt `attempt + 1`, given that `attempt` (1-based) failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// When a relation whose `attempt`-th try just failed may be retried.
    ///
    /// `None` once the ceiling is reached or the failure is permanent; such
    /// relations stay failed until an operator acts.
    pub fn next_retry_at(
        &self,
        attempt: u32,
        kind: FailureKind,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if kind == FailureKind::Permanent || attempt >= self.max_attempts {
            return None;
        }
        let delay = chrono::Duration::from_std(self.backoff(attempt)).ok()?;
        now.checked_add_signed(delay)
    }
}

/// Totals for one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub attempted: usize,
    pub synced: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Periodic re-attempt of due relations.
pub struct RetrySweeper {
    workers: Arc<SessionWorkers>,
    interval: Duration,
    batch_size: u32,
    stale_after: Duration,
}

impl RetrySweeper {
    pub fn new(workers: Arc<SessionWorkers>, config: &RetryConfig) -> Self {
        Self {
            workers,
            interval: Duration::from_secs(config.sweep_interval_secs.max(1)),
            batch_size: config.batch_size.max(1),
            stale_after: Duration::from_secs(config.stale_pending_secs),
        }
    }

    /// Run until `cancel` fires. Retries already queued are abandoned along
    /// with the workers.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        // Skip the immediate first tick.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.sweep_once(&cancel).await {
                        Ok(report) if report.attempted > 0 => info!(
                            attempted = report.attempted,
                            synced = report.synced,
                            failed = report.failed,
                            skipped = report.skipped,
                            "retry sweep finished"
                        ),
                        Ok(_) => debug!("retry sweep found nothing due"),
                        Err(e) => warn!(error = %e, "retry sweep failed (non-fatal)"),
                    }
                }
                _ = cancel.cancelled() => {
                    info!("retry sweeper shutting down");
                    break;
                }
            }
        }
    }

    /// Load one batch of due relations, queue each on its session worker,
    /// and wait for the outcomes.
    pub async fn sweep_once(&self, cancel: &CancellationToken) -> Result<SweepReport, MirrorgateError> {
        let now = Utc::now();
        let stale = chrono::Duration::from_std(self.stale_after)
            .map_err(|e| MirrorgateError::Internal(format!("stale window out of range: {e}")))?;
        let due = self
            .workers
            .engine()
            .storage()
            .list_due(now, now - stale, self.batch_size)
            .await?;

        let mut report = SweepReport::default();
        let mut queued = Vec::with_capacity(due.len());
        for relation in due {
            if cancel.is_cancelled() {
                break;
            }
            report.attempted += 1;
            match self
                .workers
                .queue_retry(&relation.session_id, relation.id)
                .await
            {
                Ok(rx) => queued.push((relation.id, rx)),
                Err(e) => {
                    warn!(relation_id = relation.id, error = %e, "retry not queued");
                    report.failed += 1;
                }
            }
        }

        for (relation_id, rx) in queued {
            match rx.await {
                Ok(Ok(RetryOutcome::Synced(_))) => report.synced += 1,
                Ok(Ok(RetryOutcome::Failed { .. })) => report.failed += 1,
                Ok(Ok(RetryOutcome::Skipped { reason, .. })) => {
                    debug!(relation_id, reason, "retry skipped");
                    report.skipped += 1;
                }
                Ok(Err(e)) => {
                    warn!(relation_id, error = %e, "retry attempt errored");
                    report.failed += 1;
                }
                Err(_) => {
                    debug!(relation_id, "worker stopped before the retry ran");
                    report.skipped += 1;
                }
            }
        }
        Ok(report)
    }
}
