// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the mirror system.
//!
//! Wire format:
//! - `POST {base}/conversations/{conversation}/messages` creates a message
//!   and answers `{"id": ..., "conversation_id": ...}`.
//! - `PATCH {base}/conversations/{conversation}/messages/{id}` updates it.
//!
//! Both carry the loop-guard markers under `metadata`.

use std::time::Duration;

use async_trait::async_trait;
use mirrorgate_config::model::MirrorConfig;
use mirrorgate_core::types::{
    AdapterType, Direction, HealthStatus, MessageContent, MirrorCreate, MirrorMessageRef,
    MirrorMetadata, MirrorUpdate,
};
use mirrorgate_core::{MirrorClient, MirrorgateError, PluginAdapter};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http::{build_client, decode_error, request_error, segment_url, status_error, Upstream};

#[derive(Debug, Serialize)]
struct CreateBody<'a> {
    session_id: &'a str,
    chat_address: &'a str,
    direction: Direction,
    content: &'a MessageContent,
    metadata: &'a MirrorMetadata,
}

#[derive(Debug, Serialize)]
struct UpdateBody<'a> {
    content: &'a MessageContent,
    deleted: bool,
    metadata: &'a MirrorMetadata,
}

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    id: serde_json::Value,
    #[serde(default)]
    conversation_id: Option<serde_json::Value>,
}

/// Renders a JSON id that may be numeric or textual.
fn id_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Mirror-system client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpMirrorClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpMirrorClient {
    pub fn new(config: &MirrorConfig) -> Result<Self, MirrorgateError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| MirrorgateError::Config("mirror.base_url is not set".into()))?;
        let timeout = Duration::from_secs(config.timeout_secs);
        Ok(Self {
            client: build_client(config.api_token.as_deref(), timeout)?,
            base_url,
            timeout,
        })
    }
}

#[async_trait]
impl PluginAdapter for HttpMirrorClient {
    fn name(&self) -> &str {
        "http-mirror"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Mirror
    }

    async fn health_check(&self) -> Result<HealthStatus, MirrorgateError> {
        let url = segment_url(&self.base_url, &["health"])?;
        match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => Ok(HealthStatus::Healthy),
            Ok(resp) => Ok(HealthStatus::Degraded(format!("mirror returned {}", resp.status()))),
            Err(e) => Ok(HealthStatus::Unhealthy(format!("mirror unreachable: {e}"))),
        }
    }

    async fn shutdown(&self) -> Result<(), MirrorgateError> {
        Ok(())
    }
}

#[async_trait]
impl MirrorClient for HttpMirrorClient {
    async fn create_message(&self, req: MirrorCreate) -> Result<MirrorMessageRef, MirrorgateError> {
        let url = segment_url(
            &self.base_url,
            &["conversations", &req.conversation_ref, "messages"],
        )?;
        let body = CreateBody {
            session_id: &req.session_id,
            chat_address: &req.chat_address,
            direction: req.direction,
            content: &req.content,
            metadata: &req.metadata,
        };
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(Upstream::Mirror, e, self.timeout))?;
        if !response.status().is_success() {
            return Err(status_error(Upstream::Mirror, response).await);
        }
        let created: CreatedResponse = response
            .json()
            .await
            .map_err(|e| decode_error(Upstream::Mirror, e))?;

        let message_id = id_text(&created.id).ok_or_else(|| {
            MirrorgateError::mirror_permanent(format!("mirror returned an unusable id: {}", created.id))
        })?;
        let conversation_id = created
            .conversation_id
            .as_ref()
            .and_then(id_text)
            .unwrap_or(req.conversation_ref);
        debug!(conversation = %conversation_id, mirror_message_id = %message_id, "mirror message created");
        Ok(MirrorMessageRef {
            conversation_id,
            message_id,
        })
    }

    async fn update_message(&self, req: MirrorUpdate) -> Result<(), MirrorgateError> {
        let url = segment_url(
            &self.base_url,
            &[
                "conversations",
                &req.target.conversation_id,
                "messages",
                &req.target.message_id,
            ],
        )?;
        let body = UpdateBody {
            content: &req.content,
            deleted: req.deleted,
            metadata: &req.metadata,
        };
        let response = self
            .client
            .patch(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(Upstream::Mirror, e, self.timeout))?;
        if !response.status().is_success() {
            return Err(status_error(Upstream::Mirror, response).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrorgate_core::FailureKind;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str) -> HttpMirrorClient {
        HttpMirrorClient::new(&MirrorConfig {
            base_url: Some(base_url.to_string()),
            api_token: Some("mirror-token".into()),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn create_request() -> MirrorCreate {
        MirrorCreate {
            session_id: "S1".into(),
            conversation_ref: "S1:a@remote".into(),
            chat_address: "a@remote".into(),
            direction: Direction::FromOther,
            content: MessageContent::text("hello"),
            metadata: MirrorMetadata {
                echo_token: Some("ek-1".into()),
                source_token: Some("mirrorgate:S1:wa-100".into()),
            },
        }
    }

    #[tokio::test]
    async fn create_sends_markers_and_parses_numeric_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations/S1:a@remote/messages"))
            .and(header("authorization", "Bearer mirror-token"))
            .and(body_partial_json(serde_json::json!({
                "metadata": {"echo_token": "ek-1", "source_token": "mirrorgate:S1:wa-100"},
                "content": {"type": "text", "body": "hello"}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 55})))
            .mount(&server)
            .await;

        let created = client(&server.uri()).create_message(create_request()).await.unwrap();
        assert_eq!(created.message_id, "55");
        assert_eq!(created.conversation_id, "S1:a@remote");
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = client(&server.uri()).create_message(create_request()).await.unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::Transient);
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn auth_errors_are_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server.uri()).create_message(create_request()).await.unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::Permanent);
    }

    #[tokio::test]
    async fn update_patches_target_message() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/conversations/c-1/messages/cw-55"))
            .and(body_partial_json(serde_json::json!({"deleted": true})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server.uri())
            .update_message(MirrorUpdate {
                target: MirrorMessageRef {
                    conversation_id: "c-1".into(),
                    message_id: "cw-55".into(),
                },
                content: MessageContent::text("gone"),
                deleted: true,
                metadata: MirrorMetadata::default(),
            })
            .await
            .unwrap();
    }

    #[test]
    fn missing_base_url_is_a_config_error() {
        let err = HttpMirrorClient::new(&MirrorConfig::default()).unwrap_err();
        assert!(matches!(err, MirrorgateError::Config(_)));
    }
}
