//! Hand-rolled test doubles shared across the contract tests. No mocking
//! framework.

use async_trait::async_trait;
use chrono::Utc;
use reconciler_core::config::{DnsProviderConfig, OperationMode, OperatorConfig};
use reconciler_core::provider::{Features, NormalizedRecordSpec, ProviderAdapter};
use reconciler_core::record::{Record, RecordType};
use reconciler_core::spec::{DesiredSpec, SourceKind};
use reconciler_core::{Error, ErrorKind, Result, SourceExtractor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A provider double whose records live in a `Mutex<Vec<Record>>` and
/// whose next N calls can be scripted to fail with a given `ErrorKind`,
/// for exercising the retry policy without a real network.
pub struct ScriptedProvider {
    pub records: Mutex<Vec<Record>>,
    pub fail_next: Mutex<Vec<ErrorKind>>,
    pub create_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub features: Features,
    pub next_id: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(features: Features) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            fail_next: Mutex::new(Vec::new()),
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            features,
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn script_failure(&self, kind: ErrorKind) {
        self.fail_next.lock().unwrap().push(kind);
    }

    fn maybe_fail(&self) -> Option<Error> {
        let mut queue = self.fail_next.lock().unwrap();
        if queue.is_empty() {
            None
        } else {
            Some(Error::provider("scripted", queue.remove(0), "scripted failure"))
        }
    }

    fn to_record(&self, id: String, spec: &NormalizedRecordSpec) -> Record {
        Record {
            id,
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
        }
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn provider_name(&self) -> &'static str {
        "scripted"
    }
    fn capabilities(&self) -> Features {
        self.features
    }
    fn zone(&self) -> &str {
        "example.com"
    }
    async fn list_zone_records(&self) -> Result<Vec<Record>> {
        Ok(self.records.lock().unwrap().clone())
    }
    async fn create_record(&self, spec: &NormalizedRecordSpec) -> Result<Record> {
        if let Some(err) = self.maybe_fail() {
            return Err(err);
        }
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let record = self.to_record(id, spec);
        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }
    async fn update_record(&self, id: &str, spec: &NormalizedRecordSpec) -> Result<Record> {
        if let Some(err) = self.maybe_fail() {
            return Err(err);
        }
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let record = self.to_record(id.to_string(), spec);
        let mut records = self.records.lock().unwrap();
        if let Some(existing) = records.iter_mut().find(|r| r.id == id) {
            *existing = record.clone();
        }
        Ok(record)
    }
    async fn delete_record(&self, id: &str) -> Result<()> {
        if let Some(err) = self.maybe_fail() {
            return Err(err);
        }
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.records.lock().unwrap().retain(|r| r.id != id);
        Ok(())
    }
}

pub struct StaticExtractor(pub Vec<DesiredSpec>);

#[async_trait]
impl SourceExtractor for StaticExtractor {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Container
    }
    async fn extract(&self) -> Result<Vec<DesiredSpec>> {
        Ok(self.0.clone())
    }
}

pub fn a_record_spec(hostname: &str, content: &str) -> DesiredSpec {
    let mut spec = DesiredSpec::new(hostname, RecordType::A, SourceKind::Container);
    spec.content = Some(content.to_string());
    spec
}

pub fn minimal_operator() -> OperatorConfig {
    OperatorConfig {
        provider: DnsProviderConfig::Cloudflare {
            api_token: "test-token".into(),
            zone_id: None,
            account_id: None,
        },
        poll_interval_secs: 3600,
        watch_docker_events: false,
        cleanup_orphaned: true,
        cleanup_grace_period_mins: 15,
        default_ttl: 300,
        default_proxied: false,
        default_type: RecordType::A,
        cache_refresh_interval_secs: 3600,
        ip_refresh_interval_secs: 3600,
        label_prefixes: vec!["dns.".into()],
        preserved_hostnames: vec![],
        managed_hostnames: vec![],
        api_timeout_ms: 10_000,
        operation_mode: OperationMode::Both,
        log_level: "info".into(),
    }
}

pub fn now() -> chrono::DateTime<Utc> {
    Utc::now()
}
