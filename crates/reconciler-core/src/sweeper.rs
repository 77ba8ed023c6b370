//! Orphan Sweeper: finds tracked records no longer named by any
//! desired spec, marks the first sighting, and deletes them once the
//! grace period elapses — unless they match the preservation list, in
//! which case the entry is demoted (untracked, orphan marker dropped)
//! and left alone indefinitely.

use crate::cache::{CacheWrite, RecordCache};
use crate::error::Result;
use crate::events::EngineEvent;
use crate::provider::ProviderAdapter;
use crate::record::RecordKey;
use crate::spec::DesiredSpec;
use crate::tracker::Tracker;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub deleted: usize,
    pub preserved: usize,
    pub still_waiting: usize,
    pub newly_orphaned: usize,
}

pub struct OrphanSweeper {
    provider: Arc<dyn ProviderAdapter>,
    cache: Arc<RecordCache>,
    tracker: Arc<dyn Tracker>,
    events: broadcast::Sender<EngineEvent>,
    grace_period: ChronoDuration,
    cleanup_enabled: bool,
}

impl OrphanSweeper {
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        cache: Arc<RecordCache>,
        tracker: Arc<dyn Tracker>,
        events: broadcast::Sender<EngineEvent>,
        grace_period: ChronoDuration,
        cleanup_enabled: bool,
    ) -> Self {
        Self {
            provider,
            cache,
            tracker,
            events,
            grace_period,
            cleanup_enabled,
        }
    }

    /// Run one sweep pass against the current desired set. Called right
    /// after a reconciliation pass, using the same desired specs so a
    /// hostname that just disappeared from the source is immediately
    /// recognized as undesired rather than waiting for the next extract.
    pub async fn sweep(&self, desired: &[DesiredSpec], now: DateTime<Utc>) -> Result<SweepReport> {
        let desired_keys: HashSet<(crate::record::RecordType, String)> = desired
            .iter()
            .map(|s| (s.record_type, s.hostname.to_ascii_lowercase()))
            .collect();

        let preserved = self.tracker.preservation_list().await?;
        let tracked = self.tracker.list_tracked().await?;
        let mut report = SweepReport::default();

        for entry in tracked {
            let still_desired = desired_keys.contains(&(entry.key.record_type, entry.key.name.clone()));
            if still_desired {
                if entry.is_orphaned() {
                    self.tracker.clear_orphan(&entry.key).await?;
                }
                continue;
            }

            if preserved.matches(&entry.key.name) {
                self.tracker.untrack(&entry.key).await?;
                report.preserved += 1;
                let _ = self.events.send(EngineEvent::RecordPreserved { key: entry.key.clone() });
                continue;
            }

            if !entry.is_orphaned() {
                self.tracker.mark_orphan(&entry.key, now).await?;
                report.newly_orphaned += 1;
                let _ = self.events.send(EngineEvent::RecordOrphaned {
                    key: entry.key.clone(),
                    since: now,
                });
                continue;
            }

            let orphaned_since = entry.orphaned_since.unwrap_or(now);
            let elapsed = now - orphaned_since;
            if !self.cleanup_enabled || elapsed < self.grace_period {
                report.still_waiting += 1;
                continue;
            }

            match self.delete(&entry.key).await {
                Ok(()) => {
                    self.tracker
                        .record_orphan_deletion(&entry, "grace_period_elapsed", now)
                        .await?;
                    self.tracker.untrack(&entry.key).await?;
                    report.deleted += 1;
                    let _ = self.events.send(EngineEvent::RecordDeleted {
                        key: entry.key.clone(),
                        reason: "grace_period_elapsed".to_string(),
                    });
                }
                Err(e) => {
                    warn!(key = %entry.key, error = %e.redacted(), "failed to delete orphaned record");
                }
            }
        }

        info!(
            deleted = report.deleted,
            preserved = report.preserved,
            still_waiting = report.still_waiting,
            newly_orphaned = report.newly_orphaned,
            "orphan sweep finished"
        );
        let _ = self.events.send(EngineEvent::SweeperRan {
            at: now,
            deleted: report.deleted,
            preserved: report.preserved,
            still_waiting: report.still_waiting,
        });

        Ok(report)
    }

    async fn delete(&self, key: &RecordKey) -> Result<()> {
        let current = self.cache.get(None).await?;
        let Some(record) = current
            .iter()
            .find(|r| r.record_type == key.record_type && r.name.eq_ignore_ascii_case(&key.name))
        else {
            // Already gone from the provider; nothing to delete.
            return Ok(());
        };
        // NotFoundError on delete is idempotent success: the provider
        // already agrees the record is gone.
        match self.provider.delete_record(&record.id).await {
            Ok(()) => {}
            Err(e) if e.kind() == Some(crate::error::ErrorKind::NotFound) => {}
            Err(e) => return Err(e),
        }
        self.cache.apply(CacheWrite::Remove(record.id.clone())).await;
        Ok(())
    }
}
