// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fire-and-forget webhook delivery of bridge notifications.
//!
//! Each notification is POSTed as JSON on its own task. When a secret is
//! configured the body is signed with HMAC-SHA256 and the hex digest sent in
//! `X-Mirrorgate-Signature: sha256=<digest>`. Failures are logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use hmac::{Hmac, Mac};
use mirrorgate_config::model::WebhookConfig;
use mirrorgate_core::types::Notification;
use mirrorgate_core::{MirrorgateError, Notifier};
use sha2::Sha256;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-mirrorgate-signature";
pub const EVENT_HEADER: &str = "x-mirrorgate-event";

/// Computes the `sha256=<hex>` signature of a webhook body.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, MirrorgateError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| MirrorgateError::Config(format!("invalid webhook secret: {e}")))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

fn event_name(notification: &Notification) -> &'static str {
    match notification {
        Notification::ChatUpserted { .. } => "chat.upserted",
        Notification::ChatDeleted { .. } => "chat.deleted",
        Notification::MessageUpserted { .. } => "message.upserted",
        Notification::MessageDeleted { .. } => "message.deleted",
        Notification::RelationSynced { .. } => "relation.synced",
        Notification::RelationFailed { .. } => "relation.failed",
    }
}

#[derive(Debug)]
struct Inner {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
}

/// [`Notifier`] posting every notification to one webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    inner: Arc<Inner>,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig) -> Result<Self, MirrorgateError> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| MirrorgateError::Config("webhook.url is not set".into()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MirrorgateError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                url,
                secret: config.secret.clone().filter(|s| !s.is_empty()),
            }),
        })
    }

    /// Delivers one notification and waits for the response.
    pub async fn deliver(&self, notification: &Notification) -> Result<(), MirrorgateError> {
        let body = serde_json::to_vec(notification)
            .map_err(|e| MirrorgateError::Internal(format!("failed to encode notification: {e}")))?;
        let mut request = self
            .inner
            .client
            .post(&self.inner.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(EVENT_HEADER, event_name(notification));
        if let Some(secret) = &self.inner.secret {
            request = request.header(SIGNATURE_HEADER, sign(secret, &body)?);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| MirrorgateError::Internal(format!("webhook request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(MirrorgateError::Internal(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        debug!(event = event_name(notification), "webhook delivered");
        Ok(())
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, notification: Notification) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(event = event_name(&notification), "no runtime for webhook delivery, dropping");
            return;
        };
        let this = self.clone();
        runtime.spawn(async move {
            if let Err(e) = this.deliver(&notification).await {
                warn!(
                    event = event_name(&notification),
                    session = %notification.session_id(),
                    error = %e,
                    "webhook delivery failed"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notifier(url: String, secret: Option<&str>) -> WebhookNotifier {
        WebhookNotifier::new(&WebhookConfig {
            url: Some(url),
            secret: secret.map(str::to_string),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn chat_deleted() -> Notification {
        Notification::ChatDeleted {
            session_id: "S1".into(),
            address: "a@remote".into(),
        }
    }

    #[test]
    fn signature_is_stable_hex() {
        let sig = sign("secret", b"{}").unwrap();
        assert!(sig.starts_with("sha256="));
        assert_eq!(sig.len(), "sha256=".len() + 64);
        assert_eq!(sig, sign("secret", b"{}").unwrap());
        assert_ne!(sig, sign("other", b"{}").unwrap());
    }

    #[tokio::test]
    async fn deliver_signs_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks"))
            .and(header(EVENT_HEADER, "chat.deleted"))
            .and(header_exists(SIGNATURE_HEADER))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = notifier(format!("{}/hooks", server.uri()), Some("s3cret"));
        notifier.deliver(&chat_deleted()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let received = &requests[0];
        let body: serde_json::Value = serde_json::from_slice(&received.body).unwrap();
        assert_eq!(body["event"], "chat.deleted");
        assert_eq!(body["session_id"], "S1");
        let signature = received
            .headers
            .get(SIGNATURE_HEADER)
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(signature, sign("s3cret", &received.body).unwrap());
    }

    #[tokio::test]
    async fn unsigned_without_secret() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        notifier(server.uri(), None).deliver(&chat_deleted()).await.unwrap();
        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get(SIGNATURE_HEADER).is_none());
    }

    #[tokio::test]
    async fn notify_delivers_in_background() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        notifier(server.uri(), None).notify(chat_deleted());
        for _ in 0..100 {
            if !server.received_requests().await.unwrap().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("webhook was never delivered");
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = notifier(server.uri(), None).deliver(&chat_deleted()).await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
