// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mirrorgate - messaging gateway with a helpdesk mirror bridge.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod admin;
mod serve;
mod shutdown;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mirrorgate_config::MirrorgateConfig;

/// Mirrorgate - messaging gateway with a helpdesk mirror bridge.
#[derive(Parser, Debug)]
#[command(name = "mirrorgate", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway, session workers, and retry sweeper.
    Serve,
    /// Query a running gateway's health endpoint.
    Status {
        /// Output JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// List failed sync relations of a session.
    Failed {
        session: String,
        #[arg(long, default_value_t = 50)]
        limit: u32,
        /// Output JSON.
        #[arg(long)]
        json: bool,
    },
    /// Re-attempt one sync relation now, including permanent failures.
    Retry { relation_id: i64 },
    /// Delete one sync relation record.
    Purge { relation_id: i64 },
}

fn load_config(path: Option<&PathBuf>) -> MirrorgateConfig {
    let loaded = match path {
        Some(path) => mirrorgate_config::load_and_validate_path(path),
        None => mirrorgate_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            mirrorgate_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Status { json, plain }) => status::run_status(&config, json, plain).await,
        Some(Commands::Failed {
            session,
            limit,
            json,
        }) => admin::run_failed(&config, &session, limit, json).await,
        Some(Commands::Retry { relation_id }) => admin::run_retry(&config, relation_id).await,
        Some(Commands::Purge { relation_id }) => admin::run_purge(&config, relation_id).await,
        None => {
            println!("mirrorgate: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_failed_with_defaults() {
        let cli = Cli::parse_from(["mirrorgate", "failed", "S1"]);
        match cli.command {
            Some(Commands::Failed {
                session,
                limit,
                json,
            }) => {
                assert_eq!(session, "S1");
                assert_eq!(limit, 50);
                assert!(!json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::parse_from(["mirrorgate", "retry", "7", "--config", "/tmp/m.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/m.toml")));
        assert!(matches!(cli.command, Some(Commands::Retry { relation_id: 7 })));
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = mirrorgate_config::load_and_validate_str("")
            .expect("default config should be valid");
        assert_eq!(config.gateway.name, "mirrorgate");
    }
}
