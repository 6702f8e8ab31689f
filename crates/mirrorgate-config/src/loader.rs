// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./mirrorgate.toml` > `~/.config/mirrorgate/mirrorgate.toml`
//! > `/etc/mirrorgate/mirrorgate.toml`, with environment variable overrides via
//! the `MIRRORGATE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::MirrorgateConfig;

/// Config sections addressable from the environment, in match order.
const ENV_SECTIONS: &[&str] = &[
    "gateway", "storage", "bridge", "retry", "mirror", "device", "webhook",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/mirrorgate/mirrorgate.toml`
/// 3. `~/.config/mirrorgate/mirrorgate.toml`
/// 4. `./mirrorgate.toml`
/// 5. `MIRRORGATE_*` environment variables
pub fn load_config() -> Result<MirrorgateConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<MirrorgateConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MirrorgateConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<MirrorgateConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MirrorgateConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(MirrorgateConfig::default()))
        .merge(Toml::file("/etc/mirrorgate/mirrorgate.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("mirrorgate/mirrorgate.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("mirrorgate.toml"))
        .merge(env_provider())
}

/// Environment provider mapping `MIRRORGATE_<SECTION>_<KEY>` to `section.key`.
///
/// Uses `Env::map()` rather than `Env::split("_")`: keys such as `api_token`
/// contain underscores and must not be split further.
pub(crate) fn env_provider() -> Env {
    Env::prefixed("MIRRORGATE_").map(|key| map_env_key(key.as_str()).into())
}

/// Maps a lowercased, prefix-stripped env var name to a dotted config path.
pub(crate) fn map_env_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    for section in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_only_at_the_section() {
        assert_eq!(map_env_key("mirror_api_token"), "mirror.api_token");
        assert_eq!(map_env_key("retry_max_attempts"), "retry.max_attempts");
        assert_eq!(map_env_key("bridge_auto_create_chat"), "bridge.auto_create_chat");
        assert_eq!(map_env_key("unrelated"), "unrelated");
    }

    #[test]
    fn env_overrides_file_values() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("mirrorgate.toml", "[mirror]\nbase_url = \"https://file.example\"\n")?;
            jail.set_env("MIRRORGATE_MIRROR_BASE_URL", "https://env.example");
            jail.set_env("MIRRORGATE_RETRY_MAX_ATTEMPTS", "9");

            let config = load_config_from_path(Path::new("mirrorgate.toml"))?;
            assert_eq!(config.mirror.base_url.as_deref(), Some("https://env.example"));
            assert_eq!(config.retry.max_attempts, 9);
            Ok(())
        });
    }
}
