//! Tracker: the trusted core component recording which records this
//! system created, when they were last confirmed desired, and the
//! preservation list. `reconciler-tracker-sqlite` provides the durable
//! implementation; `InMemoryTracker` here is the default for tests and
//! for running without persistence.

use crate::record::RecordKey;
use crate::spec::SourceKind;
use crate::tracked::{PreservationList, TrackedEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;

/// Trust level: trusted (core component). Implementations must be
/// durable across process restarts for any deployment that cares about
/// distinguishing "record predates this system" from "record this
/// system created," but the trait itself does not mandate a backend.
#[async_trait]
pub trait Tracker: Send + Sync {
    async fn track(&self, key: &RecordKey, source: SourceKind, now: DateTime<Utc>) -> Result<()>;
    async fn untrack(&self, key: &RecordKey) -> Result<()>;
    async fn is_tracked(&self, key: &RecordKey) -> Result<bool>;
    async fn get(&self, key: &RecordKey) -> Result<Option<TrackedEntry>>;
    async fn confirm(&self, key: &RecordKey, now: DateTime<Utc>) -> Result<()>;
    async fn mark_orphan(&self, key: &RecordKey, since: DateTime<Utc>) -> Result<()>;
    async fn clear_orphan(&self, key: &RecordKey) -> Result<()>;
    async fn list_tracked(&self) -> Result<Vec<TrackedEntry>>;

    async fn preservation_list(&self) -> Result<PreservationList>;
    async fn add_preserved(&self, pattern: &str) -> Result<()>;
    async fn remove_preserved(&self, pattern: &str) -> Result<()>;

    /// Append-only history entry recorded the moment a record is deleted
    /// by the orphan sweeper. No synthesized rows — only real deletions
    /// are recorded.
    async fn record_orphan_deletion(
        &self,
        entry: &TrackedEntry,
        reason: &str,
        deleted_at: DateTime<Utc>,
    ) -> Result<()>;
}

#[derive(Default)]
struct State {
    entries: HashMap<RecordKey, TrackedEntry>,
    preserved: PreservationList,
}

/// In-process `Tracker` with no persistence. Used by tests and as the
/// zero-configuration fallback; anything beyond a single process restart
/// should use `reconciler-tracker-sqlite`.
pub struct InMemoryTracker {
    state: Arc<RwLock<State>>,
}

impl InMemoryTracker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
        }
    }
}

impl Default for InMemoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tracker for InMemoryTracker {
    async fn track(&self, key: &RecordKey, source: SourceKind, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .entries
            .entry(key.clone())
            .or_insert_with(|| TrackedEntry::new(key.clone(), source, now));
        Ok(())
    }

    async fn untrack(&self, key: &RecordKey) -> Result<()> {
        self.state.write().await.entries.remove(key);
        Ok(())
    }

    async fn is_tracked(&self, key: &RecordKey) -> Result<bool> {
        Ok(self.state.read().await.entries.contains_key(key))
    }

    async fn get(&self, key: &RecordKey) -> Result<Option<TrackedEntry>> {
        Ok(self.state.read().await.entries.get(key).cloned())
    }

    async fn confirm(&self, key: &RecordKey, now: DateTime<Utc>) -> Result<()> {
        if let Some(entry) = self.state.write().await.entries.get_mut(key) {
            entry.last_confirmed = now;
            entry.orphaned_since = None;
        }
        Ok(())
    }

    async fn mark_orphan(&self, key: &RecordKey, since: DateTime<Utc>) -> Result<()> {
        if let Some(entry) = self.state.write().await.entries.get_mut(key) {
            if entry.orphaned_since.is_none() {
                entry.orphaned_since = Some(since);
            }
        }
        Ok(())
    }

    async fn clear_orphan(&self, key: &RecordKey) -> Result<()> {
        if let Some(entry) = self.state.write().await.entries.get_mut(key) {
            entry.orphaned_since = None;
        }
        Ok(())
    }

    async fn list_tracked(&self) -> Result<Vec<TrackedEntry>> {
        Ok(self.state.read().await.entries.values().cloned().collect())
    }

    async fn preservation_list(&self) -> Result<PreservationList> {
        Ok(self.state.read().await.preserved.clone())
    }

    async fn add_preserved(&self, pattern: &str) -> Result<()> {
        self.state.write().await.preserved.add(pattern);
        Ok(())
    }

    async fn remove_preserved(&self, pattern: &str) -> Result<()> {
        self.state.write().await.preserved.remove(pattern);
        Ok(())
    }

    async fn record_orphan_deletion(
        &self,
        _entry: &TrackedEntry,
        _reason: &str,
        _deleted_at: DateTime<Utc>,
    ) -> Result<()> {
        // In-memory tracker keeps no audit history; sqlite-backed tracker does.
        Ok(())
    }
}
