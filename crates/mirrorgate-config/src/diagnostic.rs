// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns figment errors into miette diagnostics that point into
//! `mirrorgate.toml`.
//!
//! Unknown keys are reported with the section they appeared in, a
//! Jaro-Winkler "did you mean" suggestion (`max_atempts` under `[retry]`
//! suggests `max_attempts`), and the keys that section accepts. Keys that
//! only exist on `[bridge]` get a dedicated hint when they show up inside a
//! `[[bridge.sessions]]` override.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Minimum Jaro-Winkler similarity for a suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// `[bridge]` keys that have no per-session override.
const BRIDGE_ONLY_KEYS: &[&str] = &["mirror_conversation_template", "sessions"];

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown key `{key}` in {section}")]
    #[diagnostic(
        code(mirrorgate::config::unknown_key),
        help("{}", unknown_key_help(key, section, suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        /// Header as written in the file, e.g. `[retry]` or `[[bridge.sessions]]`.
        section: String,
        suggestion: Option<String>,
        valid_keys: String,
        #[label("not a {section} key")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("invalid value for `{key}`: {detail}")]
    #[diagnostic(code(mirrorgate::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
        #[label("set here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("missing required key `{key}` in {section}")]
    #[diagnostic(
        code(mirrorgate::config::missing_key),
        help("add `{key} = <value>` under {section}")
    )]
    MissingKey { key: String, section: String },

    /// Semantic check that failed after a successful parse.
    #[error("validation error: {message}")]
    #[diagnostic(code(mirrorgate::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(mirrorgate::config::other))]
    Other(String),
}

fn unknown_key_help(
    key: &str,
    section: &str,
    suggestion: Option<&str>,
    valid_keys: &str,
) -> String {
    if section == "[[bridge.sessions]]" && BRIDGE_ONLY_KEYS.contains(&key) {
        return format!("`{key}` applies to every session; set it under [bridge]");
    }
    match suggestion {
        Some(s) => format!("did you mean `{s}`? {section} accepts: {valid_keys}"),
        None => format!("{section} accepts: {valid_keys}"),
    }
}

/// Renders a figment path as the TOML header that owns it. Array indices
/// turn the header into an array-of-tables header.
pub fn section_header(path: &[String]) -> String {
    let names: Vec<&str> = path
        .iter()
        .map(String::as_str)
        .filter(|p| p.parse::<usize>().is_err())
        .collect();
    if names.is_empty() {
        return "the top level".to_string();
    }
    let dotted = names.join(".");
    if names.len() < path.len() {
        format!("[[{dotted}]]")
    } else {
        format!("[{dotted}]")
    }
}

/// Convert a `figment::Error` (which may hold several errors) into diagnostics.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| match &error.kind {
            Kind::UnknownField(field, expected) => {
                let section = owning_section(&error.path, field);
                let (span, src) = locate(&error, section, field, toml_sources);
                ConfigError::UnknownKey {
                    key: field.clone(),
                    section: section_header(section),
                    suggestion: suggest_key(field, expected),
                    valid_keys: expected.join(", "),
                    span,
                    src,
                }
            }
            Kind::MissingField(field) => ConfigError::MissingKey {
                key: field.to_string(),
                section: section_header(&error.path),
            },
            Kind::InvalidType(actual, expected) => {
                // The path ends with the offending key itself.
                let (span, src) = match error.path.split_last() {
                    Some((field, parent)) => locate(&error, parent, field, toml_sources),
                    None => (None, None),
                };
                ConfigError::InvalidType {
                    key: error.path.join("."),
                    detail: format!("found {actual}"),
                    expected: expected.to_string(),
                    span,
                    src,
                }
            }
            _ => ConfigError::Other(error.to_string()),
        })
        .collect()
}

/// figment reports unknown keys with the key itself as the last path segment.
fn owning_section<'a>(path: &'a [String], field: &str) -> &'a [String] {
    match path.split_last() {
        Some((last, parent)) if last == field => parent,
        _ => path,
    }
}

fn locate(
    error: &figment::error::Error,
    section: &[String],
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let file = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|s| match s {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });

    // Inline sources carry no file metadata; fall back to the only source given.
    let source = match file {
        Some(path) => toml_sources.iter().find(|(p, _)| *p == path),
        None if toml_sources.len() == 1 => toml_sources.first(),
        None => None,
    };

    match source {
        Some((path, content)) => match find_key_offset(content, section, field) {
            Some(offset) => (
                Some(SourceSpan::new(offset.into(), field.len())),
                Some(NamedSource::new(path, content.clone())),
            ),
            None => (None, None),
        },
        None => (None, None),
    }
}

/// Byte offset of `field` in `content`, searched after the header of
/// `section` (`["bridge", "sessions", "0"]` matches `[[bridge.sessions]]`).
/// An empty section searches from the start of the file.
pub fn find_key_offset(content: &str, section: &[String], field: &str) -> Option<usize> {
    let start = if section.is_empty() {
        0
    } else {
        let header = section_header(section);
        content.find(&header)? + header.len()
    };

    let mut offset = start;
    for line in content[start..].split_inclusive('\n') {
        let key = line.trim_start();
        if key
            .strip_prefix(field)
            .is_some_and(|rest| rest.trim_start().starts_with('='))
        {
            return Some(offset + line.len() - key.len());
        }
        offset += line.len();
    }
    None
}

/// The valid key closest to `unknown`, if any clears the threshold.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Render diagnostics to stderr using miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        match handler.render_report(&mut buf, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{buf}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
    if errors.len() > 1 {
        eprintln!("{} problems in configuration", errors.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn retry_typo_suggests_max_attempts() {
        let valid = &["max_attempts", "base_delay_secs", "max_delay_secs", "batch_size"];
        assert_eq!(
            suggest_key("max_atempts", valid),
            Some("max_attempts".to_string())
        );
    }

    #[test]
    fn unrelated_key_gets_no_suggestion() {
        let valid = &["max_attempts", "base_delay_secs"];
        assert_eq!(suggest_key("zzzzzz", valid), None);
    }

    #[test]
    fn headers_follow_toml_syntax() {
        assert_eq!(section_header(&[]), "the top level");
        assert_eq!(section_header(&path(&["retry"])), "[retry]");
        assert_eq!(
            section_header(&path(&["bridge", "sessions", "1"])),
            "[[bridge.sessions]]"
        );
    }

    #[test]
    fn unknown_key_path_is_trimmed_to_its_table() {
        let reported = path(&["bridge", "sessions", "0", "sesion"]);
        assert_eq!(
            owning_section(&reported, "sesion"),
            &path(&["bridge", "sessions", "0"])[..]
        );
        assert_eq!(owning_section(&path(&["retry"]), "batch"), &path(&["retry"])[..]);
    }

    #[test]
    fn bridge_only_key_inside_session_override_gets_hint() {
        let help = unknown_key_help(
            "mirror_conversation_template",
            "[[bridge.sessions]]",
            None,
            "session, enabled",
        );
        assert!(help.contains("set it under [bridge]"), "got: {help}");

        let help = unknown_key_help("auto_create_chats", "[bridge]", Some("auto_create_chat"), "");
        assert!(help.starts_with("did you mean `auto_create_chat`?"), "got: {help}");
    }

    #[test]
    fn key_is_found_inside_its_section_only() {
        let content = "batch_size = 1\n\n[retry]\nbatch_size = 50\n";
        let o = find_key_offset(content, &path(&["retry"]), "batch_size").unwrap();
        assert_eq!(o, content.rfind("batch_size").unwrap());
        assert_eq!(find_key_offset(content, &[], "batch_size"), Some(0));
    }

    #[test]
    fn key_is_found_in_session_override() {
        let content = "[bridge]\nenabled = true\n\n[[bridge.sessions]]\nsesion = \"S1\"\n";
        let o = find_key_offset(content, &path(&["bridge", "sessions", "0"]), "sesion").unwrap();
        assert_eq!(&content[o..o + 6], "sesion");
    }

    #[test]
    fn key_prefix_does_not_match_longer_key() {
        let content = "[retry]\nmax_delay_secs = 60\n";
        assert_eq!(find_key_offset(content, &path(&["retry"]), "max_delay"), None);
    }
}
