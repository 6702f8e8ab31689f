// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mirrorgate status` command implementation.
//!
//! Queries the gateway health endpoint. Falls back gracefully when the
//! gateway is not running.

use std::io::IsTerminal;
use std::time::Duration;

use mirrorgate_config::MirrorgateConfig;
use mirrorgate_core::MirrorgateError;
use serde::{Deserialize, Serialize};

/// Health endpoint response from the gateway.
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_secs: u64,
    #[serde(default)]
    sessions: usize,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub status: String,
    pub version: Option<String>,
    pub uptime_secs: Option<u64>,
    pub uptime_human: Option<String>,
    pub sessions: Option<usize>,
    pub gateway_host: String,
    pub gateway_port: u16,
}

/// Format seconds into a human-readable duration string.
fn format_uptime(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// A wildcard bind address is reached through loopback.
pub(crate) fn client_host(bind_address: &str) -> &str {
    match bind_address {
        "0.0.0.0" | "::" | "[::]" => "127.0.0.1",
        other => other,
    }
}

/// Run the `mirrorgate status` command.
pub async fn run_status(
    config: &MirrorgateConfig,
    json: bool,
    plain: bool,
) -> Result<(), MirrorgateError> {
    let host = client_host(&config.gateway.bind_address).to_string();
    let port = config.gateway.port;
    let url = format!("http://{host}:{port}/health");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .map_err(|e| MirrorgateError::Internal(format!("failed to create HTTP client: {e}")))?;

    let health = match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => Some(
            resp.json::<HealthResponse>()
                .await
                .map_err(|e| {
                    MirrorgateError::Internal(format!("failed to parse health response: {e}"))
                })?,
        ),
        _ => None,
    };

    let use_color = !plain && std::io::stdout().is_terminal();
    match health {
        Some(health) => {
            let uptime_human = format_uptime(health.uptime_secs);
            if json {
                print_json(&StatusResponse {
                    running: true,
                    status: health.status,
                    version: Some(health.version),
                    uptime_secs: Some(health.uptime_secs),
                    uptime_human: Some(uptime_human),
                    sessions: Some(health.sessions),
                    gateway_host: host,
                    gateway_port: port,
                });
            } else {
                print_status_running(&health.status, &uptime_human, health.sessions, use_color);
            }
        }
        None => {
            if json {
                print_json(&StatusResponse {
                    running: false,
                    status: "not running".to_string(),
                    version: None,
                    uptime_secs: None,
                    uptime_human: None,
                    sessions: None,
                    gateway_host: host,
                    gateway_port: port,
                });
            } else {
                print_status_offline(&host, port, use_color);
            }
        }
    }

    Ok(())
}

fn print_json(status: &StatusResponse) {
    println!(
        "{}",
        serde_json::to_string_pretty(status).unwrap_or_else(|_| "{}".to_string())
    );
}

/// Print running status with optional colors.
fn print_status_running(status: &str, uptime: &str, sessions: usize, use_color: bool) {
    println!();
    println!("  mirrorgate status");
    println!("  {}", "-".repeat(35));

    if use_color {
        use colored::Colorize;
        println!(
            "    State:    {} {} (uptime: {})",
            "✓".green(),
            status.green(),
            uptime
        );
    } else {
        println!("    State:    [OK] {status} (uptime: {uptime})");
    }
    println!("    Sessions: {sessions}");

    println!();
}

/// Print offline status with optional colors.
fn print_status_offline(host: &str, port: u16, use_color: bool) {
    println!();
    println!("  mirrorgate status");
    println!("  {}", "-".repeat(35));

    if use_color {
        use colored::Colorize;
        println!("    State:    {} {}", "✗".red(), "not running".red());
    } else {
        println!("    State:    [FAIL] not running");
    }

    println!("    Endpoint: http://{host}:{port}/health");
    println!();
    println!("  Start with: mirrorgate serve");
    println!();
}
