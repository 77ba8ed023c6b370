//! Record Cache: the single in-memory view of a zone's records,
//! refreshed from the provider on a timer and kept current by
//! write-through updates from the reconciler
//!
//! Readers get a consistent snapshot via an atomically-swapped `Arc`:
//! refreshing replaces the whole `Arc<Vec<Record>>` in one `RwLock`
//! write rather than mutating records in place, so a reader holding an
//! older clone never observes a half-updated list.

use crate::error::Result;
use crate::provider::ProviderAdapter;
use crate::record::{Record, RecordType};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub record_type: Option<RecordType>,
    pub name_contains: Option<String>,
}

impl RecordFilter {
    fn matches(&self, record: &Record) -> bool {
        if let Some(rt) = self.record_type {
            if record.record_type != rt {
                return false;
            }
        }
        if let Some(needle) = &self.name_contains {
            if !record.name.contains(needle.as_str()) {
                return false;
            }
        }
        true
    }
}

/// A single pending write applied against both the provider and the
/// cache's own snapshot (write-through).
pub enum CacheWrite {
    Insert(Record),
    Replace(Record),
    Remove(String),
}

pub struct RecordCache {
    provider: Arc<dyn ProviderAdapter>,
    records: RwLock<Arc<Vec<Record>>>,
    last_refreshed: RwLock<Option<Instant>>,
    refresh_gate: Mutex<()>,
    refresh_interval: Duration,
}

impl RecordCache {
    pub fn new(provider: Arc<dyn ProviderAdapter>, refresh_interval: Duration) -> Self {
        Self {
            provider,
            records: RwLock::new(Arc::new(Vec::new())),
            last_refreshed: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            refresh_interval,
        }
    }

    /// Current snapshot, refreshing first if the cache is empty or the
    /// refresh interval has elapsed. Concurrent callers during a refresh
    /// coalesce onto the same in-flight call (single-flight via
    /// `refresh_gate`) rather than issuing duplicate provider requests.
    pub async fn get(&self, filter: Option<&RecordFilter>) -> Result<Vec<Record>> {
        if self.needs_refresh().await {
            self.refresh(false).await?;
        }
        let snapshot = self.records.read().await.clone();
        Ok(match filter {
            Some(f) => snapshot.iter().filter(|r| f.matches(r)).cloned().collect(),
            None => snapshot.as_ref().clone(),
        })
    }

    async fn needs_refresh(&self) -> bool {
        match *self.last_refreshed.read().await {
            None => true,
            Some(t) => t.elapsed() >= self.refresh_interval,
        }
    }

    /// Re-list the zone from the provider and atomically publish the new
    /// snapshot. `force` bypasses the staleness check (used by the
    /// periodic background refresh and by explicit cache-busting calls).
    pub async fn refresh(&self, force: bool) -> Result<Vec<Record>> {
        let _gate = self.refresh_gate.lock().await;
        // Double-check after acquiring the gate: a concurrent caller may
        // have already refreshed while we waited.
        if !force && !self.needs_refresh().await {
            return Ok(self.records.read().await.as_ref().clone());
        }
        debug!(provider = self.provider.provider_name(), "refreshing record cache");
        let fresh = self.provider.list_zone_records().await?;
        info!(
            provider = self.provider.provider_name(),
            count = fresh.len(),
            "record cache refreshed"
        );
        *self.records.write().await = Arc::new(fresh.clone());
        *self.last_refreshed.write().await = Some(Instant::now());
        Ok(fresh)
    }

    /// Apply a write-through update to the in-memory snapshot without
    /// waiting for the next refresh cycle. Called by the reconciler right
    /// after a successful provider mutation.
    pub async fn apply(&self, write: CacheWrite) {
        let mut guard = self.records.write().await;
        let mut next = guard.as_ref().clone();
        match write {
            CacheWrite::Insert(record) => next.push(record),
            CacheWrite::Replace(record) => {
                if let Some(existing) = next.iter_mut().find(|r| r.id == record.id) {
                    *existing = record;
                } else {
                    next.push(record);
                }
            }
            CacheWrite::Remove(id) => next.retain(|r| r.id != id),
        }
        *guard = Arc::new(next);
    }

    /// Spawn the periodic background refresh loop. Errors are logged and
    /// do not terminate the loop — a transient provider outage should not
    /// stop future refresh attempts.
    pub fn spawn_background_refresh(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = self.refresh_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it, refresh() handles cold start
            loop {
                ticker.tick().await;
                if let Err(err) = self.refresh(true).await {
                    warn!(error = %err, "background cache refresh failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Features, NormalizedRecordSpec};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        records: Vec<Record>,
    }

    #[async_trait]
    impl ProviderAdapter for CountingProvider {
        fn provider_name(&self) -> &'static str {
            "counting"
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
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.clone())
        }
        async fn create_record(&self, _spec: &NormalizedRecordSpec) -> Result<Record> {
            unimplemented!()
        }
        async fn update_record(&self, _id: &str, _spec: &NormalizedRecordSpec) -> Result<Record> {
            unimplemented!()
        }
        async fn delete_record(&self, _id: &str) -> Result<()> {
            unimplemented!()
        }
    }

    fn sample_record() -> Record {
        Record {
            id: "1".into(),
            zone: "example.com".into(),
            record_type: RecordType::A,
            name: "app.example.com".into(),
            content: "1.2.3.4".into(),
            ttl: 300,
            proxied: false,
            priority: None,
            weight: None,
            port: None,
            flags: None,
            tag: None,
        }
    }

    #[tokio::test]
    async fn get_refreshes_on_first_call_only() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            records: vec![sample_record()],
        });
        let cache = RecordCache::new(provider.clone(), Duration::from_secs(3600));
        let first = cache.get(None).await.unwrap();
        let second = cache.get(None).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn apply_write_through_is_visible_before_next_refresh() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            records: vec![],
        });
        let cache = RecordCache::new(provider, Duration::from_secs(3600));
        cache.get(None).await.unwrap();
        cache.apply(CacheWrite::Insert(sample_record())).await;
        let snapshot = cache.get(None).await.unwrap();
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn filter_by_record_type() {
        let mut txt = sample_record();
        txt.record_type = RecordType::Txt;
        txt.id = "2".into();
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            records: vec![sample_record(), txt],
        });
        let cache = RecordCache::new(provider, Duration::from_secs(3600));
        let filtered = cache
            .get(Some(&RecordFilter {
                record_type: Some(RecordType::Txt),
                name_contains: None,
            }))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].record_type, RecordType::Txt);
    }
}
