// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator commands on sync relations: `failed`, `retry`, `purge`.
//!
//! `failed` and `purge` work on the database directly. `retry` goes through
//! a running gateway when there is one.

use std::time::Duration;

use mirrorgate_bridge::RetryOutcome;
use mirrorgate_config::MirrorgateConfig;
use mirrorgate_core::types::SyncRelation;
use mirrorgate_core::{FailureKind, MirrorgateError, RelationStore, StorageAdapter};
use mirrorgate_storage::SqliteStorage;
use serde::Deserialize;

use crate::serve::build_engine;
use crate::status::client_host;

async fn open_storage(config: &MirrorgateConfig) -> Result<SqliteStorage, MirrorgateError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    Ok(storage)
}

/// One tab-separated line per relation.
fn format_relation(relation: &SyncRelation) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}",
        relation.id,
        relation.direction,
        relation
            .failure_kind
            .map(|k| k.to_string())
            .unwrap_or_else(|| "-".to_string()),
        relation.retry_count,
        relation
            .next_retry_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string()),
        relation.last_error.as_deref().unwrap_or(""),
    )
}

/// Run `mirrorgate failed <session>`.
pub async fn run_failed(
    config: &MirrorgateConfig,
    session_id: &str,
    limit: u32,
    json: bool,
) -> Result<(), MirrorgateError> {
    let storage = open_storage(config).await?;
    let relations = storage.list_failed(session_id, limit).await?;

    if json {
        let out = serde_json::to_string_pretty(&relations)
            .map_err(|e| MirrorgateError::Internal(format!("failed to encode relations: {e}")))?;
        println!("{out}");
    } else if relations.is_empty() {
        println!("no failed relations for session {session_id}");
    } else {
        println!("id\tdirection\tkind\tattempts\tnext_retry\terror");
        for relation in &relations {
            println!("{}", format_relation(relation));
        }
    }
    storage.close().await
}

/// Retry result in the shape the gateway's retry route returns.
#[derive(Debug, Deserialize)]
struct RetryReport {
    outcome: String,
    #[serde(default)]
    relation: Option<SyncRelation>,
    #[serde(default)]
    failure_kind: Option<FailureKind>,
    #[serde(default)]
    reason: Option<String>,
}

impl From<RetryOutcome> for RetryReport {
    fn from(outcome: RetryOutcome) -> Self {
        match outcome {
            RetryOutcome::Synced(relation) => Self {
                outcome: "synced".to_string(),
                relation: Some(relation),
                failure_kind: None,
                reason: None,
            },
            RetryOutcome::Failed { relation, kind } => Self {
                outcome: "failed".to_string(),
                relation: Some(relation),
                failure_kind: Some(kind),
                reason: None,
            },
            RetryOutcome::Skipped { reason, .. } => Self {
                outcome: "skipped".to_string(),
                relation: None,
                failure_kind: None,
                reason: Some(reason.to_string()),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GatewayError {
    error: String,
}

/// Asks a running gateway to retry the relation on its session worker.
/// `None` when no gateway answers.
async fn retry_via_gateway(
    config: &MirrorgateConfig,
    relation_id: i64,
) -> Result<Option<RetryReport>, MirrorgateError> {
    let host = client_host(&config.gateway.bind_address);
    let url = format!(
        "http://{host}:{}/v1/relations/{relation_id}/retry",
        config.gateway.port
    );
    let client = reqwest::Client::builder()
        // Queued events and the mirror call both run before the reply.
        .timeout(Duration::from_secs(config.mirror.timeout_secs.saturating_add(30)))
        .build()
        .map_err(|e| MirrorgateError::Internal(format!("failed to create HTTP client: {e}")))?;

    let mut request = client.post(&url);
    if let Some(token) = &config.gateway.bearer_token {
        request = request.bearer_auth(token);
    }
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) if e.is_connect() => return Ok(None),
        Err(e) => {
            return Err(MirrorgateError::Internal(format!("gateway request failed: {e}")));
        }
    };

    let status = response.status();
    if status.is_success() {
        return response.json::<RetryReport>().await.map(Some).map_err(|e| {
            MirrorgateError::Internal(format!("failed to parse retry response: {e}"))
        });
    }
    let message = response
        .json::<GatewayError>()
        .await
        .map(|body| body.error)
        .unwrap_or_else(|_| status.to_string());
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(MirrorgateError::NotFound {
            entity: "relation",
            key: relation_id.to_string(),
        });
    }
    Err(MirrorgateError::Internal(format!(
        "gateway refused retry ({status}): {message}"
    )))
}

/// Run `mirrorgate retry <id>`.
///
/// A running gateway performs the retry so it queues behind that session's
/// live events. Without one nothing else is reconciling, and the engine runs
/// it in this process.
pub async fn run_retry(config: &MirrorgateConfig, relation_id: i64) -> Result<(), MirrorgateError> {
    let report = match retry_via_gateway(config, relation_id).await? {
        Some(report) => report,
        None => {
            let wiring = build_engine(config).await?;
            let outcome = wiring.engine.retry_by_id(relation_id).await;
            wiring.storage.close().await?;
            RetryReport::from(outcome?)
        }
    };
    print_retry(relation_id, report)
}

fn print_retry(relation_id: i64, report: RetryReport) -> Result<(), MirrorgateError> {
    match report.outcome.as_str() {
        "failed" => Err(MirrorgateError::Internal(format!(
            "relation {relation_id} failed again ({}): {}",
            report
                .failure_kind
                .map(|k| k.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            report
                .relation
                .and_then(|r| r.last_error)
                .unwrap_or_default()
        ))),
        "skipped" => {
            println!(
                "relation {relation_id} skipped: {}",
                report.reason.unwrap_or_default()
            );
            Ok(())
        }
        _ => {
            println!("relation {relation_id} {}", report.outcome);
            Ok(())
        }
    }
}

/// Run `mirrorgate purge <id>`.
pub async fn run_purge(config: &MirrorgateConfig, relation_id: i64) -> Result<(), MirrorgateError> {
    let storage = open_storage(config).await?;
    let purged = storage.purge_relation(relation_id).await?;
    storage.close().await?;
    if !purged {
        return Err(MirrorgateError::NotFound {
            entity: "relation",
            key: relation_id.to_string(),
        });
    }
    println!("relation {relation_id} purged");
    Ok(())
}
