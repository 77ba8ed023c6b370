//! reconcilerd — thin daemon wiring for the DNS reconciliation engine.
//!
//! This binary is integration glue ONLY: it resolves configuration from
//! `RECONCILER_*` environment variables, registers the provider/source
//! implementations this build ships, wires them into one `Engine`, and
//! runs it until a shutdown signal arrives. All reconciliation, caching,
//! tracking, and retry logic lives in `reconciler-core` and the
//! provider/source/tracker crates; this file adds none of its own.
//!
//! ## Configuration
//!
//! See `reconciler_core::config::OperatorConfig::from_env` for the full
//! set of recognized `RECONCILER_*` variables. Additionally, this daemon
//! reads:
//!
//! - `RECONCILER_TRACKER_DB_PATH` — SQLite path for the tracker,
//!   default `./reconciler-tracker.db`.
//! - `RECONCILER_ROUTER_CONFIG_FILE` — path to the router dynamic-config
//!   tree (YAML or JSON), required when `operation_mode` is `router` or
//!   `both`.
//! - `RECONCILER_CONCURRENCY` — bounded mutation worker pool size,
//!   default 4.
//!
//! `RECONCILER_MANAGED_HOSTNAMES` is wired into a `ManualSourceExtractor`
//! alongside the docker/router extractors, and
//! `RECONCILER_PRESERVED_HOSTNAMES` seeds the tracker's preservation list
//! once at startup — both regardless of `operation_mode`, since neither
//! is an extraction *mode* the way docker/router are.
//!
//! ## Example
//!
//! ```bash
//! export RECONCILER_DNS_PROVIDER=cloudflare
//! export RECONCILER_CLOUDFLARE_API_TOKEN=...
//! export RECONCILER_CLOUDFLARE_ZONE_ID=...
//! export RECONCILER_WATCH_DOCKER_EVENTS=true
//! export RECONCILER_OPERATION_MODE=both
//! export RECONCILER_ROUTER_CONFIG_FILE=/etc/reconciler/routers.yaml
//! reconcilerd
//! ```

use anyhow::{Context, Result};
use reconciler_core::config::OperationMode;
use reconciler_core::scheduler::IpResolverTask;
use reconciler_core::{
    Engine, ManualSourceExtractor, OperatorConfig, ProviderAdapter, Registry, SourceExtractor, Tracker,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

fn default_tracker_db_path() -> String {
    "./reconciler-tracker.db".to_string()
}

fn default_concurrency() -> usize {
    4
}

fn build_registry() -> Registry {
    let registry = Registry::new();
    reconciler_provider_cloudflare::register(&registry);
    reconciler_provider_digitalocean::register(&registry);
    reconciler_provider_route53::register(&registry);
    reconciler_source_docker::register(&registry);
    reconciler_source_router::register(&registry);
    registry
}

async fn build_extractors(
    operator: &OperatorConfig,
    registry: &Registry,
) -> Result<Vec<Arc<dyn SourceExtractor>>> {
    let mut extractors: Vec<Arc<dyn SourceExtractor>> = Vec::new();

    let want_container = matches!(operator.operation_mode, OperationMode::Direct | OperationMode::Both);
    let want_router = matches!(operator.operation_mode, OperationMode::Router | OperationMode::Both);

    if want_container {
        let config = serde_json::json!({
            "label_prefixes": operator.label_prefixes,
            "default_type": operator.default_type,
        });
        let extractor = registry
            .create_extractor("docker", config)
            .await
            .context("failed to start container-label source extractor")?;
        extractors.push(Arc::from(extractor));
    }

    if want_router {
        let path = std::env::var("RECONCILER_ROUTER_CONFIG_FILE")
            .context("RECONCILER_ROUTER_CONFIG_FILE is required when operation_mode is router or both")?;
        let extractor = Arc::new(reconciler_source_router::RouterSourceExtractor::with_default_type(
            path,
            operator.label_prefixes.clone(),
            operator.default_type,
        ));
        extractors.push(extractor);
    }

    if !operator.managed_hostnames.is_empty() {
        let extractor = ManualSourceExtractor::new(&operator.managed_hostnames, operator.default_type)
            .context("invalid entry in RECONCILER_MANAGED_HOSTNAMES")?;
        extractors.push(Arc::new(extractor));
    }

    if extractors.is_empty() {
        warn!("no source extractors are active for the configured operation_mode");
    }

    Ok(extractors)
}

async fn run() -> Result<()> {
    let operator = OperatorConfig::from_env().context("failed to resolve operator configuration")?;

    let registry = build_registry();

    let provider_config =
        serde_json::to_value(&operator.provider).context("failed to serialize provider configuration")?;
    let provider: Arc<dyn ProviderAdapter> = Arc::from(
        registry
            .create_provider(operator.provider.type_name(), provider_config)
            .await
            .context("failed to initialize dns provider")?,
    );
    info!(provider = provider.provider_name(), zone = provider.zone(), "provider connected");

    let tracker_db_path = std::env::var("RECONCILER_TRACKER_DB_PATH").unwrap_or_else(|_| default_tracker_db_path());
    let tracker: Arc<dyn Tracker> = Arc::new(
        reconciler_tracker_sqlite::SqliteTracker::connect(&tracker_db_path)
            .await
            .context("failed to open tracker database")?,
    );
    info!(path = %tracker_db_path, "tracker database opened");

    // `add_preserved` is idempotent, so re-seeding on every startup against
    // an already-populated db is harmless.
    for pattern in &operator.preserved_hostnames {
        tracker
            .add_preserved(pattern)
            .await
            .with_context(|| format!("failed to seed preserved hostname pattern {pattern}"))?;
    }

    let extractors = build_extractors(&operator, &registry).await?;

    let ip_resolver = Arc::new(IpResolverTask::new(
        Arc::new(reconciler_ip_http::HttpIpResolver::new()),
        Duration::from_secs(operator.ip_refresh_interval_secs),
    ));
    let ip_resolver_handle = ip_resolver.clone().spawn();

    let concurrency = std::env::var("RECONCILER_CONCURRENCY")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(default_concurrency);

    let engine = Arc::new(Engine::new(
        provider,
        tracker,
        extractors,
        Some(ip_resolver),
        operator.clone(),
        Some(concurrency),
    ));

    if operator.watch_docker_events {
        match bollard::Docker::connect_with_local_defaults() {
            Ok(docker) => {
                info!("subscribing to docker events");
                reconciler_source_docker::spawn_event_watcher(docker, engine.change_trigger());
            }
            Err(e) => {
                warn!(error = %e, "watch_docker_events is set but failed to connect to the docker daemon; falling back to poll-only");
            }
        }
    }

    let shutdown = shutdown_signal();
    let result = engine.run_with_shutdown(shutdown).await;
    ip_resolver_handle.abort();
    result.map_err(|e| anyhow::anyhow!("engine error: {}", e.redacted()))
}

/// Resolves when either SIGINT or SIGTERM arrives, so the daemon shuts
/// down cleanly under both an interactive Ctrl-C and a container
/// orchestrator's stop signal.
fn shutdown_signal() -> tokio::sync::oneshot::Receiver<()> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                    let _ = tx.send(());
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
                _ = sigterm.recv() => info!("received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("received ctrl-c");
        }
        let _ = tx.send(());
    });
    rx
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_env("RECONCILER_LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run()) {
        Ok(()) => {
            info!("reconcilerd shut down cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "reconcilerd exited with an error");
            ExitCode::FAILURE
        }
    }
}
