// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Mirrorgate bridge.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Whether a failed external call may be retried automatically.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network errors, timeouts, 5xx responses. Eligible for bounded retry.
    Transient,
    /// Authentication/authorization or malformed requests. Needs an operator.
    Permanent,
}

/// The primary error type used across all Mirrorgate crates.
#[derive(Debug, Error)]
pub enum MirrorgateError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed identifiers or missing required fields. Rejected before any write.
    #[error("validation error: {0}")]
    Validation(String),

    /// A uniqueness violation that could not be resolved by re-reading and merging.
    #[error("conflict on {entity} `{key}`")]
    Conflict { entity: &'static str, key: String },

    /// A targeted mutation referenced a row that does not exist.
    #[error("{entity} `{key}` not found")]
    NotFound { entity: &'static str, key: String },

    /// Storage backend errors (database connection, query failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A stored row could not be turned back into a typed entity.
    #[error("failed to decode {entity} row: {detail}")]
    Decode { entity: &'static str, detail: String },

    /// Mirror-system client errors.
    #[error("mirror error ({kind}): {message}")]
    Mirror {
        message: String,
        kind: FailureKind,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Session send-primitive errors.
    #[error("session error ({kind}): {message}")]
    Session {
        message: String,
        kind: FailureKind,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// The caller cancelled the operation before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MirrorgateError {
    /// Shorthand for a transient mirror failure without an underlying source.
    pub fn mirror_transient(message: impl Into<String>) -> Self {
        Self::Mirror {
            message: message.into(),
            kind: FailureKind::Transient,
            source: None,
        }
    }

    /// Shorthand for a permanent mirror failure without an underlying source.
    pub fn mirror_permanent(message: impl Into<String>) -> Self {
        Self::Mirror {
            message: message.into(),
            kind: FailureKind::Permanent,
            source: None,
        }
    }

    /// Shorthand for a transient session send failure.
    pub fn session_transient(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
            kind: FailureKind::Transient,
            source: None,
        }
    }

    /// Classifies this error for the retry path.
    ///
    /// External errors carry their own classification. Validation errors can
    /// never succeed on retry; everything else is assumed to be transient.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Mirror { kind, .. } | Self::Session { kind, .. } => *kind,
            Self::Validation(_) => FailureKind::Permanent,
            Self::Config(_)
            | Self::Conflict { .. }
            | Self::NotFound { .. }
            | Self::Storage { .. }
            | Self::Decode { .. }
            | Self::Timeout { .. }
            | Self::Cancelled
            | Self::Internal(_) => FailureKind::Transient,
        }
    }

    /// Returns true if an automatic retry sweep may pick this failure up again.
    pub fn is_retryable(&self) -> bool {
        self.failure_kind() == FailureKind::Transient
    }
}
