// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Loop-guard markers carried in mirror-system metadata.
//!
//! An echo token is random and minted once per relation. A source token
//! names the local message it came from as `mirrorgate:{session}:{remote_id}`.

use mirrorgate_core::MirrorgateError;

const SOURCE_PREFIX: &str = "mirrorgate";

/// Mint a fresh echo token.
pub fn mint_echo_token() -> String {
    format!("ek-{}", uuid::Uuid::new_v4().simple())
}

/// Encode the source token for a local message.
pub fn source_token(session_id: &str, remote_id: &str) -> String {
    format!("{SOURCE_PREFIX}:{session_id}:{remote_id}")
}

/// Decoded form of a source token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceToken<'a> {
    pub session_id: &'a str,
    pub remote_id: &'a str,
}

/// Parse a source token. Returns `None` for anything not minted by
/// [`source_token`].
///
/// Session ids never contain `:`; remote ids may.
pub fn parse_source_token(token: &str) -> Option<SourceToken<'_>> {
    let rest = token.strip_prefix(SOURCE_PREFIX)?.strip_prefix(':')?;
    let (session_id, remote_id) = rest.split_once(':')?;
    if session_id.is_empty() || remote_id.is_empty() {
        return None;
    }
    Some(SourceToken {
        session_id,
        remote_id,
    })
}

/// Rejects session ids that would make source tokens ambiguous.
pub fn check_session_id(session_id: &str) -> Result<(), MirrorgateError> {
    if session_id.contains(':') {
        return Err(MirrorgateError::Validation(format!(
            "session id `{session_id}` must not contain ':'"
        )));
    }
    Ok(())
}

/// Whether `token` is a well-formed source token for `session_id`.
pub fn source_token_matches_session(token: &str, session_id: &str) -> bool {
    parse_source_token(token).is_some_and(|t| t.session_id == session_id)
}
