//! Engine: wires the cache, reconciler, sweeper, tracker, and source
//! extractors together and owns the one event loop that drives a
//! reconciliation pass on a timer, on a debounced source-change
//! trigger, or on an explicit `force_cleanup()` call.
//!
//! `run()` listens for `ctrl_c()` in production; `run_with_shutdown()`
//! takes an explicit shutdown receiver for tests and embedders that
//! want their own signal handling.

use crate::cache::RecordCache;
use crate::config::OperatorConfig;
use crate::error::Result;
use crate::events::EngineEvent;
use crate::extractor::SourceExtractor;
use crate::provider::ProviderAdapter;
use crate::reconciler::{PassReport, Reconciler};
use crate::record::Record;
use crate::scheduler::{Debouncer, IpResolverTask, PauseGate, PublicIpSnapshot};
use crate::spec::merge_desired;
use crate::sweeper::{OrphanSweeper, SweepReport};
use crate::tracked::TrackedEntry;
use crate::tracker::Tracker;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

pub struct Engine {
    cache: Arc<RecordCache>,
    tracker: Arc<dyn Tracker>,
    reconciler: Arc<Reconciler>,
    sweeper: Arc<OrphanSweeper>,
    extractors: Vec<Arc<dyn SourceExtractor>>,
    ip_resolver: Option<Arc<IpResolverTask>>,
    operator: OperatorConfig,
    pause_gate: Arc<PauseGate>,
    debounce_trigger: mpsc::UnboundedSender<()>,
    debounce_rx: Mutex<mpsc::UnboundedReceiver<()>>,
    events_tx: broadcast::Sender<EngineEvent>,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        tracker: Arc<dyn Tracker>,
        extractors: Vec<Arc<dyn SourceExtractor>>,
        ip_resolver: Option<Arc<IpResolverTask>>,
        operator: OperatorConfig,
        concurrency: Option<usize>,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(operator_event_capacity());
        let cache = Arc::new(RecordCache::new(
            provider.clone(),
            Duration::from_secs(operator.cache_refresh_interval_secs),
        ));
        let reconciler = Arc::new(Reconciler::new(
            provider.clone(),
            cache.clone(),
            tracker.clone(),
            events_tx.clone(),
            concurrency,
        ));
        let sweeper = Arc::new(OrphanSweeper::new(
            provider,
            cache.clone(),
            tracker.clone(),
            events_tx.clone(),
            chrono::Duration::minutes(operator.cleanup_grace_period_mins as i64),
            operator.cleanup_orphaned,
        ));
        // `Debouncer::new` spawns its own collapsing task; cloning the
        // sender keeps the channel open for the engine's lifetime even
        // after `debouncer` itself is dropped here.
        let (debouncer, debounce_rx) = Debouncer::new(Duration::from_secs(2));
        let debounce_trigger = debouncer.handle();

        Self {
            cache,
            tracker,
            reconciler,
            sweeper,
            extractors,
            ip_resolver,
            operator,
            pause_gate: Arc::new(PauseGate::new()),
            debounce_trigger,
            debounce_rx: Mutex::new(debounce_rx),
            events_tx,
        }
    }

    /// A container-source extractor can call this (via the handle
    /// returned by `change_trigger()`) to request an out-of-cycle pass
    /// when it observes a Docker event, instead of waiting for the poll
    /// interval.
    pub fn change_trigger(&self) -> mpsc::UnboundedSender<()> {
        self.debounce_trigger.clone()
    }

    pub fn event_subscriber(&self) -> broadcast::Receiver<EngineEvent> {
        self.events_tx.subscribe()
    }

    pub async fn snapshot_cache(&self) -> Result<Vec<Record>> {
        self.cache.get(None).await
    }

    pub async fn snapshot_tracked(&self) -> Result<Vec<TrackedEntry>> {
        self.tracker.list_tracked().await
    }

    pub fn pause(&self, reason: impl Into<String>, until: Option<DateTime<Utc>>) {
        self.pause_gate.pause(reason, until);
    }

    pub fn resume(&self) {
        self.pause_gate.resume();
    }

    /// Drive one orphan-sweep pass immediately against the current
    /// desired set, independent of the poll timer. Used by an external
    /// admin action (the REST layer, out of scope here) and by tests.
    pub async fn force_cleanup(&self) -> Result<SweepReport> {
        let desired = self.extract_desired().await?;
        self.sweeper.sweep(&desired, Utc::now()).await
    }

    async fn extract_desired(&self) -> Result<Vec<crate::spec::DesiredSpec>> {
        let mut sets = Vec::with_capacity(self.extractors.len());
        for extractor in &self.extractors {
            let specs = extractor.extract().await?;
            sets.push((extractor.source_kind(), specs));
        }
        Ok(merge_desired(sets))
    }

    async fn run_cycle(&self) -> Result<PassReport> {
        if self.pause_gate.is_paused() {
            debug!("reconciliation paused, skipping cycle");
            return Ok(PassReport::default());
        }
        let desired = self.extract_desired().await?;
        let ip = match &self.ip_resolver {
            Some(resolver) => resolver.current().await,
            None => PublicIpSnapshot::default(),
        };
        let report = self
            .reconciler
            .run_pass(&desired, &self.operator, ip.v4, ip.v6)
            .await?;
        self.sweeper.sweep(&desired, Utc::now()).await?;
        Ok(report)
    }

    /// Production entry point: runs until SIGINT/SIGTERM.
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Testing entry point: runs until `shutdown` fires.
    pub async fn run_with_shutdown(&self, shutdown: oneshot::Receiver<()>) -> Result<()> {
        self.run_internal(Some(shutdown)).await
    }

    async fn run_internal(&self, shutdown: Option<oneshot::Receiver<()>>) -> Result<()> {
        if let Some(resolver) = &self.ip_resolver {
            resolver.refresh_once().await;
        }
        if self.operator.poll_interval_secs == 0 {
            return Err(crate::error::Error::config("poll_interval_secs must be > 0"));
        }

        let mut ticker = tokio::time::interval(Duration::from_secs(self.operator.poll_interval_secs));
        let mut debounce_rx = self.debounce_rx.lock().await;
        let mut shutdown = shutdown;

        info!(poll_interval_secs = self.operator.poll_interval_secs, "engine started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        warn!(error = %e.redacted(), "reconciliation cycle failed");
                    }
                }
                Some(()) = debounce_rx.recv() => {
                    if let Err(e) = self.run_cycle().await {
                        warn!(error = %e.redacted(), "triggered reconciliation cycle failed");
                    }
                }
                _ = async {
                    match shutdown.as_mut() {
                        Some(rx) => { let _ = rx.await; }
                        None => std::future::pending::<()>().await,
                    }
                }, if shutdown.is_some() => {
                    info!("engine received shutdown signal");
                    break;
                }
                _ = tokio::signal::ctrl_c(), if shutdown.is_none() => {
                    info!("engine received ctrl-c");
                    break;
                }
            }
        }
        info!("engine stopped");
        Ok(())
    }
}

fn operator_event_capacity() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Features, NormalizedRecordSpec};
    use crate::spec::{DesiredSpec, SourceKind};
    use crate::tracker::InMemoryTracker;
    use async_trait::async_trait;

    struct EmptyProvider;

    #[async_trait]
    impl ProviderAdapter for EmptyProvider {
        fn provider_name(&self) -> &'static str {
            "empty"
        }
        fn capabilities(&self) -> Features {
            Features {
                supports_proxied: false,
                ttl_floor: 1,
                requires_trailing_dot: false,
                supports_batch: false,
            }
        }
        fn zone(&self) -> &str {
            "example.com"
        }
        async fn list_zone_records(&self) -> Result<Vec<Record>> {
            Ok(vec![])
        }
        async fn create_record(&self, spec: &NormalizedRecordSpec) -> Result<Record> {
            Ok(Record {
                id: "1".into(),
                zone: spec.zone.clone(),
                record_type: spec.record_type,
                name: spec.name.clone(),
                content: spec.content.clone(),
                ttl: spec.ttl,
                proxied: spec.proxied,
                priority: spec.priority,
                weight: spec.weight,
                port: spec.port,
                flags: spec.flags,
                tag: spec.tag.clone(),
            })
        }
        async fn update_record(&self, id: &str, spec: &NormalizedRecordSpec) -> Result<Record> {
            Ok(Record {
                id: id.to_string(),
                zone: spec.zone.clone(),
                record_type: spec.record_type,
                name: spec.name.clone(),
                content: spec.content.clone(),
                ttl: spec.ttl,
                proxied: spec.proxied,
                priority: spec.priority,
                weight: spec.weight,
                port: spec.port,
                flags: spec.flags,
                tag: spec.tag.clone(),
            })
        }
        async fn delete_record(&self, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    struct StaticExtractor(Vec<DesiredSpec>);

    #[async_trait]
    impl SourceExtractor for StaticExtractor {
        fn source_kind(&self) -> SourceKind {
            SourceKind::Container
        }
        async fn extract(&self) -> Result<Vec<DesiredSpec>> {
            Ok(self.0.clone())
        }
    }

    fn operator() -> OperatorConfig {
        crate::config::OperatorConfig {
            provider: crate::config::DnsProviderConfig::Cloudflare {
                api_token: "x".into(),
                zone_id: None,
                account_id: None,
            },
            poll_interval_secs: 3600,
            watch_docker_events: false,
            cleanup_orphaned: true,
            cleanup_grace_period_mins: 15,
            default_ttl: 300,
            default_proxied: false,
            default_type: crate::record::RecordType::A,
            cache_refresh_interval_secs: 3600,
            ip_refresh_interval_secs: 3600,
            label_prefixes: vec!["dns.".into()],
            preserved_hostnames: vec![],
            managed_hostnames: vec![],
            api_timeout_ms: 10_000,
            operation_mode: crate::config::OperationMode::Both,
            log_level: "info".into(),
        }
    }

    #[tokio::test]
    async fn force_cleanup_runs_without_a_full_cycle() {
        let provider = Arc::new(EmptyProvider);
        let tracker = Arc::new(InMemoryTracker::new());
        let engine = Engine::new(provider, tracker, vec![Arc::new(StaticExtractor(vec![]))], None, operator(), None);
        let report = engine.force_cleanup().await.unwrap();
        assert_eq!(report.deleted, 0);
    }

    #[tokio::test]
    async fn shutdown_receiver_stops_the_loop() {
        let provider = Arc::new(EmptyProvider);
        let tracker = Arc::new(InMemoryTracker::new());
        let engine = Arc::new(Engine::new(
            provider,
            tracker,
            vec![Arc::new(StaticExtractor(vec![]))],
            None,
            operator(),
            None,
        ));
        let (tx, rx) = oneshot::channel();
        let engine_clone = engine.clone();
        let handle = tokio::spawn(async move { engine_clone.run_with_shutdown(rx).await });
        tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(result.is_ok());
    }
}
