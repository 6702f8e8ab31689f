// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.
//!
//! Event routes validate and enqueue, answering `202 Accepted` once the event
//! sits in its session's queue. Reconciliation happens on the worker.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use mirrorgate_bridge::tokens::check_session_id;
use mirrorgate_bridge::{BridgeEvent, RetryOutcome};
use mirrorgate_core::types::{
    Chat, DeliveryStatus, Direction, LocalMessageEvent, MessageContent, MirrorMessageEvent, Page,
    SyncRelation,
};
use mirrorgate_core::{ChatStore, FailureKind, MirrorgateError, RelationStore};
use serde::{Deserialize, Serialize};

use crate::server::GatewayState;

const MAX_LIST_LIMIT: u32 = 500;

/// Request body for POST /v1/sessions/{session}/events.
#[derive(Debug, Deserialize)]
pub struct DeviceEventRequest {
    /// Platform-assigned message id.
    pub remote_message_id: String,
    /// Chat address on the platform.
    pub chat: String,
    #[serde(default)]
    pub chat_name: Option<String>,
    #[serde(default)]
    pub is_group: Option<bool>,
    pub direction: Direction,
    pub content: MessageContent,
    #[serde(default)]
    pub sender: Option<String>,
    /// Remote id of the message being replied to.
    #[serde(default)]
    pub quoted: Option<String>,
    /// Defaults to the time of receipt.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<DeliveryStatus>,
    #[serde(default)]
    pub historical: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub reaction: Option<String>,
}

impl DeviceEventRequest {
    fn into_event(self, session_id: String) -> LocalMessageEvent {
        let status = self.status.unwrap_or(match self.direction {
            Direction::FromMe => DeliveryStatus::Sent,
            Direction::FromOther => DeliveryStatus::Delivered,
        });
        LocalMessageEvent {
            session_id,
            remote_message_id: self.remote_message_id,
            chat_address: self.chat,
            chat_name: self.chat_name,
            is_group: self.is_group,
            direction: self.direction,
            content: self.content,
            sender: self.sender,
            quoted_remote_id: self.quoted,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            status,
            historical: self.historical,
            deleted: self.deleted,
            reaction: self.reaction,
        }
    }
}

/// Request body for POST /v1/mirror/{session}/events.
#[derive(Debug, Deserialize)]
pub struct MirrorEventRequest {
    pub conversation: String,
    pub message_id: String,
    pub content: MessageContent,
    /// Mirror-side metadata; loop-guard markers are read from here.
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Target chat address, when the mirror knows it.
    #[serde(default)]
    pub chat: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl MirrorEventRequest {
    fn into_event(self, session_id: String) -> MirrorMessageEvent {
        MirrorMessageEvent {
            session_id,
            conversation_id: self.conversation,
            mirror_message_id: self.message_id,
            content: self.content,
            metadata: self.metadata,
            chat_address: self.chat,
            timestamp: self.timestamp,
        }
    }
}

/// Response body for accepted events.
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
    pub session_id: String,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Health status string.
    pub status: String,
    /// Binary version.
    pub version: String,
    /// Seconds since the gateway started.
    pub uptime_secs: u64,
    /// Sessions with a live worker.
    pub sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct ChatListResponse {
    pub chats: Vec<Chat>,
}

#[derive(Debug, Serialize)]
pub struct RelationListResponse {
    pub relations: Vec<SyncRelation>,
}

#[derive(Debug, Serialize)]
pub struct DeleteChatResponse {
    pub removed_relations: u64,
}

#[derive(Debug, Serialize)]
pub struct RetryResponse {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation: Option<SyncRelation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error description.
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
    #[serde(default)]
    pub include_archived: bool,
}

impl ListQuery {
    fn limit(&self) -> u32 {
        self.limit.unwrap_or(50).clamp(1, MAX_LIST_LIMIT)
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Maps a bridge error onto an HTTP status.
fn bridge_error(err: MirrorgateError) -> Response {
    let status = match &err {
        MirrorgateError::Validation(_) => StatusCode::BAD_REQUEST,
        MirrorgateError::NotFound { .. } => StatusCode::NOT_FOUND,
        MirrorgateError::Conflict { .. } => StatusCode::CONFLICT,
        MirrorgateError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        _ => {
            tracing::error!(error = %err, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, err.to_string())
}

async fn enqueue(state: &GatewayState, event: BridgeEvent) -> Response {
    let session_id = event.session_id().to_string();
    match state.workers.dispatch(event).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(AcceptedResponse {
                status: "accepted",
                session_id,
            }),
        )
            .into_response(),
        Err(MirrorgateError::Cancelled) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "gateway is shutting down")
        }
        Err(e) => bridge_error(e),
    }
}

/// POST /v1/sessions/{session}/events
///
/// A message observed by the device layer.
pub async fn post_device_event(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
    body: Result<Json<DeviceEventRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    if let Err(e) = check_session_id(&session_id) {
        return bridge_error(e);
    }
    let event = body.into_event(session_id);
    if let Err(e) = event.clone().into_new_message().validate() {
        return bridge_error(e);
    }
    enqueue(&state, BridgeEvent::Local(event)).await
}

/// POST /v1/mirror/{session}/events
///
/// A message created in the mirror system.
pub async fn post_mirror_event(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
    body: Result<Json<MirrorEventRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    if let Err(e) = check_session_id(&session_id) {
        return bridge_error(e);
    }
    let event = body.into_event(session_id);
    if let Err(e) = event.validate() {
        return bridge_error(e);
    }
    enqueue(&state, BridgeEvent::Mirror(event)).await
}

/// GET /v1/sessions/{session}/chats
pub async fn get_chats(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Response {
    let page = Page::new(query.limit(), query.offset.unwrap_or(0));
    match state
        .engine
        .storage()
        .list_chats(&session_id, query.include_archived, page)
        .await
    {
        Ok(chats) => Json(ChatListResponse { chats }).into_response(),
        Err(e) => bridge_error(e),
    }
}

/// DELETE /v1/sessions/{session}/chats/{address}
pub async fn delete_chat(
    State(state): State<GatewayState>,
    Path((session_id, address)): Path<(String, String)>,
) -> Response {
    match state.engine.delete_chat(&session_id, &address).await {
        Ok(Some(removed_relations)) => Json(DeleteChatResponse { removed_relations }).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("chat `{address}` not found")),
        Err(e) => bridge_error(e),
    }
}

/// GET /v1/sessions/{session}/relations/failed
pub async fn get_failed_relations(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Response {
    match state
        .engine
        .storage()
        .list_failed(&session_id, query.limit())
        .await
    {
        Ok(relations) => Json(RelationListResponse { relations }).into_response(),
        Err(e) => bridge_error(e),
    }
}

/// GET /v1/sessions/{session}/relations/counts
pub async fn get_relation_counts(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.engine.storage().count_by_status(&session_id).await {
        Ok(counts) => Json(counts).into_response(),
        Err(e) => bridge_error(e),
    }
}

/// POST /v1/relations/{id}/retry
///
/// Operator-triggered retry, including permanently failed relations. Runs
/// on the relation's session worker so it cannot race that session's live
/// events.
pub async fn post_retry_relation(
    State(state): State<GatewayState>,
    Path(relation_id): Path<i64>,
) -> Response {
    let outcome = match state.workers.retry_by_id(relation_id).await {
        Ok(outcome) => outcome,
        Err(e) => return bridge_error(e),
    };
    let body = match outcome {
        RetryOutcome::Synced(relation) => RetryResponse {
            outcome: "synced",
            relation: Some(relation),
            failure_kind: None,
            reason: None,
        },
        RetryOutcome::Failed { relation, kind } => RetryResponse {
            outcome: "failed",
            relation: Some(relation),
            failure_kind: Some(kind),
            reason: None,
        },
        RetryOutcome::Skipped { reason, .. } => RetryResponse {
            outcome: "skipped",
            relation: None,
            failure_kind: None,
            reason: Some(reason),
        },
    };
    Json(body).into_response()
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
        sessions: state.workers.session_count().await,
    })
}

/// GET /metrics
///
/// Prometheus text format, or 404 when no exporter is installed.
pub async fn get_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "metrics exporter not enabled"),
    }
}
