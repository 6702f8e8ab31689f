// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Router-level tests: requests go through the full middleware stack into
//! per-session workers backed by a temp SQLite store and mock upstreams.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use mirrorgate_bridge::SessionWorkers;
use mirrorgate_core::types::Page;
use mirrorgate_core::{ChatStore, MirrorgateError, RelationStore};
use mirrorgate_gateway::auth::AuthConfig;
use mirrorgate_gateway::{build_router, GatewayState, HealthState};
use mirrorgate_test_utils::TestHarness;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

const TOKEN: &str = "gw-token";

struct Fixture {
    harness: TestHarness,
    workers: Arc<SessionWorkers>,
    cancel: CancellationToken,
    router: Router,
}

async fn fixture(bearer_token: Option<&str>) -> Fixture {
    let harness = TestHarness::new().await.unwrap();
    let cancel = CancellationToken::new();
    let workers = Arc::new(SessionWorkers::new(
        harness.engine.clone(),
        16,
        cancel.clone(),
    ));
    let router = build_router(GatewayState {
        workers: workers.clone(),
        engine: harness.engine.clone(),
        auth: AuthConfig {
            bearer_token: bearer_token.map(str::to_string),
        },
        health: HealthState::new(),
    });
    Fixture {
        harness,
        workers,
        cancel,
        router,
    }
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {TOKEN}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {TOKEN}"))
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn device_event(remote_id: &str, body: &str) -> serde_json::Value {
    serde_json::json!({
        "remote_message_id": remote_id,
        "chat": "+551199999@remote",
        "chat_name": "Maria",
        "direction": "from_other",
        "content": {"type": "text", "body": body}
    })
}

/// Polls until `check` holds; workers reconcile after the 202.
async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn health_is_public() {
    let fx = fixture(Some(TOKEN)).await;
    let response = fx
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sessions"], 0);
}

#[tokio::test]
async fn metrics_without_exporter_is_not_found() {
    let fx = fixture(None).await;
    let response = fx
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn api_requires_bearer_token() {
    let fx = fixture(Some(TOKEN)).await;
    let request = Request::builder()
        .method("POST")
        .uri("/v1/sessions/S1/events")
        .header("content-type", "application/json")
        .body(Body::from(device_event("wa-1", "hi").to_string()))
        .unwrap();
    let response = fx.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(fx.workers.session_count().await, 0);
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let fx = fixture(Some(TOKEN)).await;
    let response = fx
        .router
        .clone()
        .oneshot(post_json(
            "/v1/sessions/S1/events",
            serde_json::json!({"chat": "a@remote"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn session_id_with_separator_is_rejected() {
    let fx = fixture(Some(TOKEN)).await;
    let response = fx
        .router
        .clone()
        .oneshot(post_json(
            "/v1/sessions/S1:evil/events",
            device_event("wa-1", "hi"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_remote_id_is_rejected_before_enqueue() {
    let fx = fixture(Some(TOKEN)).await;
    let response = fx
        .router
        .clone()
        .oneshot(post_json("/v1/sessions/S1/events", device_event(" ", "hi")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(fx.workers.session_count().await, 0);
}

#[tokio::test]
async fn device_event_is_mirrored() {
    let fx = fixture(Some(TOKEN)).await;
    let response = fx
        .router
        .clone()
        .oneshot(post_json(
            "/v1/sessions/S1/events",
            device_event("wa-100", "preciso de ajuda"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(json_body(response).await["session_id"], "S1");

    let mirror = fx.harness.mirror.clone();
    eventually(|| {
        let mirror = mirror.clone();
        async move { mirror.create_count().await == 1 }
    })
    .await;

    let response = fx
        .router
        .clone()
        .oneshot(get("/v1/sessions/S1/chats"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["chats"][0]["address"], "+551199999@remote");
    assert_eq!(body["chats"][0]["name"], "Maria");

    let response = fx
        .router
        .clone()
        .oneshot(get("/v1/sessions/S1/relations/counts"))
        .await
        .unwrap();
    let counts = json_body(response).await;
    assert_eq!(counts["synced"], 1);
    assert_eq!(counts["failed"], 0);
}

#[tokio::test]
async fn mirror_reply_is_delivered_to_session() {
    let fx = fixture(None).await;
    let response = fx
        .router
        .clone()
        .oneshot(post_json(
            "/v1/mirror/S1/events",
            serde_json::json!({
                "conversation": "S1:+551199999@remote",
                "message_id": "cw-56",
                "content": {"type": "text", "body": "on it"},
                "metadata": {}
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let session = fx.harness.session.clone();
    eventually(|| {
        let session = session.clone();
        async move { session.sent_count().await == 1 }
    })
    .await;
    let sent = fx.harness.session.sent().await;
    assert_eq!(sent[0].0.chat_address, "+551199999@remote");
}

#[tokio::test]
async fn failed_relations_are_listed_and_retried() {
    let fx = fixture(Some(TOKEN)).await;
    fx.harness
        .mirror
        .fail_next(MirrorgateError::mirror_permanent("401 unauthorized"))
        .await;

    let response = fx
        .router
        .clone()
        .oneshot(post_json("/v1/sessions/S1/events", device_event("wa-1", "hi")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let storage = fx.harness.storage.clone();
    eventually(|| {
        let storage = storage.clone();
        async move { storage.list_failed("S1", 10).await.unwrap().len() == 1 }
    })
    .await;

    let response = fx
        .router
        .clone()
        .oneshot(get("/v1/sessions/S1/relations/failed?limit=5"))
        .await
        .unwrap();
    let body = json_body(response).await;
    let relations = body["relations"].as_array().unwrap();
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0]["failure_kind"], "permanent");
    let id = relations[0]["id"].as_i64().unwrap();

    let response = fx
        .router
        .clone()
        .oneshot(post_json(&format!("/v1/relations/{id}/retry"), serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["outcome"], "synced");
    assert!(fx.harness.storage.list_failed("S1", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn retry_of_unknown_relation_is_not_found() {
    let fx = fixture(None).await;
    let response = fx
        .router
        .clone()
        .oneshot(post_json("/v1/relations/9999/retry", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_chat_removes_it_once() {
    let fx = fixture(None).await;
    fx.harness
        .engine
        .handle_local(mirrorgate_test_utils::fixtures::local_text(
            "S1",
            "a@remote",
            "wa-1",
            "hi",
        ))
        .await
        .unwrap();

    let delete = || {
        Request::builder()
            .method("DELETE")
            .uri("/v1/sessions/S1/chats/a@remote")
            .body(Body::empty())
            .unwrap()
    };
    let response = fx.router.clone().oneshot(delete()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["removed_relations"], 1);
    assert!(fx
        .harness
        .storage
        .list_chats("S1", true, Page::default())
        .await
        .unwrap()
        .is_empty());

    let response = fx.router.clone().oneshot(delete()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn events_after_shutdown_are_refused() {
    let fx = fixture(None).await;
    fx.cancel.cancel();
    let response = fx
        .router
        .clone()
        .oneshot(post_json("/v1/sessions/S1/events", device_event("wa-1", "hi")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    fx.workers.join().await;
}
