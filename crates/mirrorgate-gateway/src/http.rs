// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared plumbing for the outbound reqwest adapters.

use std::time::Duration;

use mirrorgate_core::{FailureKind, MirrorgateError};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;

/// Which collaborator a request went to; selects the error variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Upstream {
    Mirror,
    Session,
}

impl Upstream {
    fn error(
        self,
        message: String,
        kind: FailureKind,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> MirrorgateError {
        match self {
            Upstream::Mirror => MirrorgateError::Mirror {
                message,
                kind,
                source,
            },
            Upstream::Session => MirrorgateError::Session {
                message,
                kind,
                source,
            },
        }
    }
}

/// Classifies an HTTP status for the retry path.
///
/// Rate limiting, request timeouts and server errors are worth retrying;
/// any other client error will fail the same way again.
pub fn classify_status(status: StatusCode) -> FailureKind {
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        FailureKind::Transient
    } else {
        FailureKind::Permanent
    }
}

/// Builds a JSON client with an optional bearer token.
pub(crate) fn build_client(
    api_token: Option<&str>,
    timeout: Duration,
) -> Result<reqwest::Client, MirrorgateError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(token) = api_token {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| MirrorgateError::Config(format!("invalid API token header value: {e}")))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| MirrorgateError::Internal(format!("failed to build HTTP client: {e}")))
}

/// Maps a transport-level failure. Nothing reached the server, so it is transient.
pub(crate) fn request_error(
    upstream: Upstream,
    err: reqwest::Error,
    timeout: Duration,
) -> MirrorgateError {
    if err.is_timeout() {
        return MirrorgateError::Timeout { duration: timeout };
    }
    upstream.error(
        format!("HTTP request failed: {err}"),
        FailureKind::Transient,
        Some(Box::new(err)),
    )
}

/// Maps a non-success response, keeping a bounded excerpt of the body.
pub(crate) async fn status_error(upstream: Upstream, response: reqwest::Response) -> MirrorgateError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(200).collect();
    upstream.error(
        format!("upstream returned {status}: {excerpt}"),
        classify_status(status),
        None,
    )
}

/// Maps a success response whose body could not be decoded.
pub(crate) fn decode_error(upstream: Upstream, err: reqwest::Error) -> MirrorgateError {
    upstream.error(
        format!("unexpected response body: {err}"),
        FailureKind::Permanent,
        Some(Box::new(err)),
    )
}

/// Appends percent-encoded path segments to a base URL.
pub(crate) fn segment_url(base: &str, segments: &[&str]) -> Result<reqwest::Url, MirrorgateError> {
    let mut url = reqwest::Url::parse(base)
        .map_err(|e| MirrorgateError::Config(format!("invalid base url `{base}`: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| MirrorgateError::Config(format!("base url `{base}` cannot have a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
