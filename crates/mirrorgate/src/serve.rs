// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mirrorgate serve` command implementation.
//!
//! Opens SQLite storage, builds the reconciliation engine over the HTTP
//! mirror client and device sender, then runs the gateway, the per-session
//! workers and the retry sweeper until a shutdown signal arrives.

use std::sync::Arc;

use mirrorgate_bridge::{
    ConfigPolicyStore, ReconciliationEngine, RetryPolicy, RetrySweeper, SessionWorkers,
};
use mirrorgate_config::MirrorgateConfig;
use mirrorgate_core::{
    MirrorgateError, NoopNotifier, Notifier, PluginAdapter, StorageAdapter,
};
use mirrorgate_gateway::auth::AuthConfig;
use mirrorgate_gateway::{
    start_server, GatewayState, HealthState, HttpMirrorClient, HttpSessionSender, ServerConfig,
    WebhookNotifier,
};
use mirrorgate_storage::SqliteStorage;
use tracing::{info, warn};

use crate::shutdown;

/// Collaborators of a running engine, kept for orderly shutdown.
pub(crate) struct Wiring {
    pub engine: Arc<ReconciliationEngine>,
    pub storage: Arc<SqliteStorage>,
    pub mirror: Arc<HttpMirrorClient>,
    pub session: Arc<HttpSessionSender>,
}

/// Opens storage and builds the engine with the configured adapters.
pub(crate) async fn build_engine(config: &MirrorgateConfig) -> Result<Wiring, MirrorgateError> {
    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;

    let mirror = Arc::new(HttpMirrorClient::new(&config.mirror)?);
    let session = Arc::new(HttpSessionSender::new(&config.device)?);
    let notifier: Arc<dyn Notifier> = if config.webhook.url.is_some() {
        info!("webhook notifications enabled");
        Arc::new(WebhookNotifier::new(&config.webhook)?)
    } else {
        Arc::new(NoopNotifier)
    };

    let engine = ReconciliationEngine::new(
        storage.clone(),
        mirror.clone(),
        session.clone(),
        Arc::new(ConfigPolicyStore::new(config.bridge.clone())),
        notifier,
    )
    .with_retry_policy(RetryPolicy::from_config(&config.retry))
    .with_conversation_template(config.bridge.mirror_conversation_template.clone());

    Ok(Wiring {
        engine: Arc::new(engine),
        storage,
        mirror,
        session,
    })
}

/// Runs the `mirrorgate serve` command.
pub async fn run_serve(config: MirrorgateConfig) -> Result<(), MirrorgateError> {
    init_tracing(&config.gateway.log_level);

    info!(name = %config.gateway.name, "starting mirrorgate serve");

    let prometheus_render = install_prometheus();
    mirrorgate_bridge::metrics::register_metrics();

    let wiring = build_engine(&config).await?;
    let cancel = shutdown::install_signal_handler();

    let workers = Arc::new(SessionWorkers::new(
        wiring.engine.clone(),
        config.gateway.queue_capacity,
        cancel.clone(),
    ));

    let sweeper = RetrySweeper::new(workers.clone(), &config.retry);
    let sweeper_cancel = cancel.clone();
    let sweeper_handle = tokio::spawn(async move { sweeper.run(sweeper_cancel).await });

    let state = GatewayState {
        workers: workers.clone(),
        engine: wiring.engine.clone(),
        auth: AuthConfig {
            bearer_token: config.gateway.bearer_token.clone(),
        },
        health: HealthState {
            start_time: std::time::Instant::now(),
            prometheus_render,
        },
    };
    if config.gateway.bearer_token.is_none() {
        warn!("gateway.bearer_token is not set, /v1 routes are unauthenticated");
    }
    let server_config = ServerConfig {
        host: config.gateway.bind_address.clone(),
        port: config.gateway.port,
        bearer_token: config.gateway.bearer_token.clone(),
    };

    let result = start_server(&server_config, state, cancel.clone()).await;
    // A server error must stop the workers too.
    cancel.cancel();

    info!("draining session workers");
    workers.join().await;
    if let Err(e) = sweeper_handle.await {
        warn!(error = %e, "retry sweeper panicked");
    }

    for (name, outcome) in [
        ("mirror", wiring.mirror.shutdown().await),
        ("device", wiring.session.shutdown().await),
        ("storage", wiring.storage.close().await),
    ] {
        if let Err(e) = outcome {
            warn!(adapter = name, error = %e, "adapter shutdown failed");
        }
    }

    info!("mirrorgate stopped");
    result
}

#[cfg(feature = "prometheus")]
fn install_prometheus() -> Option<Arc<dyn Fn() -> String + Send + Sync>> {
    match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            info!("prometheus metrics enabled");
            Some(Arc::new(move || handle.render()))
        }
        Err(e) => {
            warn!(error = %e, "prometheus initialization failed, continuing without metrics");
            None
        }
    }
}

#[cfg(not(feature = "prometheus"))]
fn install_prometheus() -> Option<Arc<dyn Fn() -> String + Send + Sync>> {
    None
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mirrorgate={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &tempfile::TempDir, mirror_url: Option<&str>) -> MirrorgateConfig {
        let mut config = MirrorgateConfig::default();
        config.storage.database_path = dir.path().join("gate.db").to_string_lossy().to_string();
        config.mirror.base_url = mirror_url.map(str::to_string);
        config.device.base_url = Some("http://127.0.0.1:9".to_string());
        config
    }

    #[tokio::test]
    async fn build_engine_requires_mirror_url() {
        let dir = tempfile::tempdir().unwrap();
        let err = build_engine(&config_in(&dir, None)).await.err().unwrap();
        assert!(matches!(err, MirrorgateError::Config(_)));
    }

    #[tokio::test]
    async fn build_engine_opens_storage() {
        let dir = tempfile::tempdir().unwrap();
        let wiring = build_engine(&config_in(&dir, Some("http://127.0.0.1:9")))
            .await
            .unwrap();
        assert!(dir.path().join("gate.db").exists());
        assert_eq!(wiring.engine.conversation_ref("S1", "a@remote"), "S1:a@remote");
    }
}
