//! Minimal embedding example for `reconciler-core`.
//!
//! Demonstrates using the reconciliation `Engine` as a library inside a
//! custom application: a hand-rolled in-memory provider and a static
//! source extractor stand in for a real Cloudflare/DigitalOcean/Route 53
//! adapter and a Docker/router extractor. The engine's lifecycle is fully
//! owned by the application — there is no global state to initialize.

#![allow(dead_code)]

use async_trait::async_trait;
use reconciler_core::config::{DnsProviderConfig, OperationMode, OperatorConfig};
use reconciler_core::provider::{Features, NormalizedRecordSpec};
use reconciler_core::record::{Record, RecordType};
use reconciler_core::spec::{DesiredSpec, SourceKind};
use reconciler_core::tracker::InMemoryTracker;
use reconciler_core::{Engine, ProviderAdapter, Result, SourceExtractor};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A provider that holds its zone in a `Mutex<HashMap>` instead of calling
/// out to a real DNS API. Good enough to exercise the reconciler end to
/// end without network access.
struct InMemoryProvider {
    zone: Mutex<HashMap<String, Record>>,
    next_id: AtomicU64,
}

impl InMemoryProvider {
    fn new() -> Self {
        Self {
            zone: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl ProviderAdapter for InMemoryProvider {
    fn provider_name(&self) -> &'static str {
        "in-memory"
    }

    fn capabilities(&self) -> Features {
        Features {
            supports_proxied: false,
            ttl_floor: 60,
            requires_trailing_dot: false,
            supports_batch: false,
        }
    }

    fn zone(&self) -> &str {
        "example.com"
    }

    async fn list_zone_records(&self) -> Result<Vec<Record>> {
        Ok(self.zone.lock().unwrap().values().cloned().collect())
    }

    async fn create_record(&self, spec: &NormalizedRecordSpec) -> Result<Record> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let record = Record {
            id: id.clone(),
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
        };
        println!("[in-memory] create {} {} -> {}", record.record_type, record.name, record.content);
        self.zone.lock().unwrap().insert(id, record.clone());
        Ok(record)
    }

    async fn update_record(&self, id: &str, spec: &NormalizedRecordSpec) -> Result<Record> {
        let record = Record {
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
        };
        println!("[in-memory] update {} {} -> {}", record.record_type, record.name, record.content);
        self.zone.lock().unwrap().insert(id.to_string(), record.clone());
        Ok(record)
    }

    async fn delete_record(&self, id: &str) -> Result<()> {
        println!("[in-memory] delete {id}");
        self.zone.lock().unwrap().remove(id);
        Ok(())
    }
}

/// A source extractor that always returns the same fixed set of desired
/// hostnames — a stand-in for a Docker or router extractor when embedding
/// without either of those collaborators available.
struct StaticExtractor(Vec<DesiredSpec>);

#[async_trait]
impl SourceExtractor for StaticExtractor {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Manual
    }

    async fn extract(&self) -> Result<Vec<DesiredSpec>> {
        Ok(self.0.clone())
    }
}

fn operator_config() -> OperatorConfig {
    OperatorConfig {
        provider: DnsProviderConfig::Cloudflare {
            api_token: "embedded-example".to_string(),
            zone_id: None,
            account_id: None,
        },
        poll_interval_secs: 3600,
        watch_docker_events: false,
        cleanup_orphaned: false,
        cleanup_grace_period_mins: 15,
        default_ttl: 300,
        default_proxied: false,
        default_type: RecordType::A,
        cache_refresh_interval_secs: 3600,
        ip_refresh_interval_secs: 3600,
        label_prefixes: vec!["dns.".to_string()],
        preserved_hostnames: vec![],
        managed_hostnames: vec![],
        api_timeout_ms: 10_000,
        operation_mode: OperationMode::Direct,
        log_level: "info".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Embedded reconciler-core Example ===\n");

    let provider = Arc::new(InMemoryProvider::new());
    let tracker = Arc::new(InMemoryTracker::new());
    let desired = vec![DesiredSpec {
        content: Some("203.0.113.7".to_string()),
        ..DesiredSpec::new("app.example.com", RecordType::A, SourceKind::Manual)
    }];
    let extractor: Arc<dyn SourceExtractor> = Arc::new(StaticExtractor(desired));

    println!("1. Creating engine...");
    let engine = Arc::new(Engine::new(provider, tracker, vec![extractor], None, operator_config(), None));

    let mut events = engine.event_subscriber();
    let event_listener = tokio::spawn(async move {
        println!("2. Event listener started");
        while let Ok(event) = events.recv().await {
            println!("[event] {event:?}");
        }
    });

    println!("3. Running engine lifecycle directly (no background loop needed for one pass)...");
    let (tx, rx) = tokio::sync::oneshot::channel();
    let engine_clone = engine.clone();
    let run_handle = tokio::spawn(async move { engine_clone.run_with_shutdown(rx).await });

    // Give the first tick a moment to land, then snapshot what the engine created.
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    let snapshot = engine.snapshot_cache().await?;
    println!("4. Cache snapshot has {} record(s)", snapshot.len());

    println!("5. Shutting the engine down...");
    let _ = tx.send(());
    let _ = run_handle.await;
    drop(event_listener);

    println!("\n=== Embedding Successful ===");
    println!("Key points:");
    println!("- Engine lifecycle is fully controlled by the embedding application");
    println!("- No global state");
    println!("- Provider and extractor are ordinary trait objects the application supplies");

    Ok(())
}
