// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Send primitive of the device/session layer over HTTP.
//!
//! `POST {base}/sessions/{session}/messages` with the target chat and the
//! content; the device answers with the platform-assigned message id.

use std::time::Duration;

use async_trait::async_trait;
use mirrorgate_config::model::DeviceConfig;
use mirrorgate_core::types::{AdapterType, HealthStatus, MessageContent, SessionSend};
use mirrorgate_core::{MirrorgateError, PluginAdapter, SessionSender};
use serde::{Deserialize, Serialize};

use crate::http::{build_client, decode_error, request_error, segment_url, status_error, Upstream};

#[derive(Debug, Serialize)]
struct SendBody<'a> {
    chat: &'a str,
    content: &'a MessageContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    quoted: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    remote_message_id: String,
}

/// [`SessionSender`] backed by the device layer's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpSessionSender {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpSessionSender {
    pub fn new(config: &DeviceConfig) -> Result<Self, MirrorgateError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| MirrorgateError::Config("device.base_url is not set".into()))?;
        let timeout = Duration::from_secs(config.timeout_secs);
        Ok(Self {
            client: build_client(config.api_token.as_deref(), timeout)?,
            base_url,
            timeout,
        })
    }
}

#[async_trait]
impl PluginAdapter for HttpSessionSender {
    fn name(&self) -> &str {
        "http-device"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Session
    }

    async fn health_check(&self) -> Result<HealthStatus, MirrorgateError> {
        let url = segment_url(&self.base_url, &["health"])?;
        match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => Ok(HealthStatus::Healthy),
            Ok(resp) => Ok(HealthStatus::Degraded(format!("device returned {}", resp.status()))),
            Err(e) => Ok(HealthStatus::Unhealthy(format!("device unreachable: {e}"))),
        }
    }

    async fn shutdown(&self) -> Result<(), MirrorgateError> {
        Ok(())
    }
}

#[async_trait]
impl SessionSender for HttpSessionSender {
    async fn send(&self, req: SessionSend) -> Result<String, MirrorgateError> {
        let url = segment_url(&self.base_url, &["sessions", &req.session_id, "messages"])?;
        let body = SendBody {
            chat: &req.chat_address,
            content: &req.content,
            quoted: req.quoted_remote_id.as_deref(),
        };
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(Upstream::Session, e, self.timeout))?;
        if !response.status().is_success() {
            return Err(status_error(Upstream::Session, response).await);
        }
        let sent: SendResponse = response
            .json()
            .await
            .map_err(|e| decode_error(Upstream::Session, e))?;
        if sent.remote_message_id.trim().is_empty() {
            return Err(MirrorgateError::Session {
                message: "device returned an empty remote message id".into(),
                kind: mirrorgate_core::FailureKind::Permanent,
                source: None,
            });
        }
        tracing::debug!(session = %req.session_id, remote_id = %sent.remote_message_id, "session send accepted");
        Ok(sent.remote_message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrorgate_core::FailureKind;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sender(base_url: &str) -> HttpSessionSender {
        HttpSessionSender::new(&DeviceConfig {
            base_url: Some(base_url.to_string()),
            api_token: None,
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn request() -> SessionSend {
        SessionSend {
            session_id: "S1".into(),
            chat_address: "+551199999@remote".into(),
            content: MessageContent::text("on it"),
            quoted_remote_id: None,
        }
    }

    #[tokio::test]
    async fn send_returns_remote_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions/S1/messages"))
            .and(body_partial_json(serde_json::json!({
                "chat": "+551199999@remote",
                "content": {"type": "text", "body": "on it"}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"remote_message_id": "wa-900"})),
            )
            .mount(&server)
            .await;

        let remote_id = sender(&server.uri()).send(request()).await.unwrap();
        assert_eq!(remote_id, "wa-900");
    }

    #[tokio::test]
    async fn disconnected_session_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = sender(&server.uri()).send(request()).await.unwrap_err();
        assert!(matches!(err, MirrorgateError::Session { .. }));
        assert_eq!(err.failure_kind(), FailureKind::Transient);
    }

    #[tokio::test]
    async fn malformed_response_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let err = sender(&server.uri()).send(request()).await.unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::Permanent);
    }
}
