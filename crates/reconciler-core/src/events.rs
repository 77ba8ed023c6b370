//! Outbound lifecycle events, broadcast to any external observer (the
//! out-of-scope WS layer would subscribe here; the core only publishes).

use crate::record::RecordKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    ReconcileStarted {
        at: DateTime<Utc>,
    },
    ReconcileFinished {
        at: DateTime<Utc>,
        created: usize,
        updated: usize,
        unchanged: usize,
        errors: usize,
    },
    RecordCreated {
        key: RecordKey,
    },
    RecordUpdated {
        key: RecordKey,
    },
    RecordDeleted {
        key: RecordKey,
        reason: String,
    },
    RecordOrphaned {
        key: RecordKey,
        since: DateTime<Utc>,
    },
    RecordPreserved {
        key: RecordKey,
    },
    SweeperRan {
        at: DateTime<Utc>,
        deleted: usize,
        preserved: usize,
        still_waiting: usize,
    },
    Paused {
        reason: String,
        until: Option<DateTime<Utc>>,
    },
    Resumed,
}
