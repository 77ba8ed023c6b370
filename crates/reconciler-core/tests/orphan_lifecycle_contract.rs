//! Contract: a record created by a reconciliation pass that later drops
//! out of the desired set is marked orphaned, survives sweeps during its
//! grace period, and is deleted once the grace period elapses — unless
//! its hostname matches the preservation list, in which case it is never
//! deleted regardless of how long it has been orphaned.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{a_record_spec, minimal_operator, ScriptedProvider};
use reconciler_core::provider::Features;
use reconciler_core::tracker::InMemoryTracker;
use reconciler_core::{OrphanSweeper, Reconciler};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn features() -> Features {
    Features {
        supports_proxied: false,
        ttl_floor: 1,
        requires_trailing_dot: false,
        supports_batch: false,
    }
}

#[tokio::test]
async fn orphan_is_deleted_only_after_grace_period_elapses() {
    let provider = Arc::new(ScriptedProvider::new(features()));
    let cache = Arc::new(reconciler_core::RecordCache::new(
        provider.clone(),
        Duration::from_secs(3600),
    ));
    let tracker = Arc::new(InMemoryTracker::new());
    let (tx, _rx) = broadcast::channel(16);
    let reconciler = Reconciler::new(provider.clone(), cache.clone(), tracker.clone(), tx.clone(), Some(2));
    let sweeper = OrphanSweeper::new(
        provider.clone(),
        cache,
        tracker,
        tx,
        ChronoDuration::minutes(15),
        true,
    );
    let operator = minimal_operator();

    reconciler
        .run_pass(&[a_record_spec("old.example.com", "10.0.0.1")], &operator, None, None)
        .await
        .unwrap();
    assert_eq!(provider.create_calls.load(Ordering::SeqCst), 1);

    let now = Utc::now();
    let first_sweep = sweeper.sweep(&[], now).await.unwrap();
    assert_eq!(first_sweep.newly_orphaned, 1);
    assert_eq!(first_sweep.deleted, 0);

    let too_soon = sweeper.sweep(&[], now + ChronoDuration::minutes(5)).await.unwrap();
    assert_eq!(too_soon.still_waiting, 1);
    assert_eq!(too_soon.deleted, 0);
    assert_eq!(provider.delete_calls.load(Ordering::SeqCst), 0);

    let after_grace = sweeper.sweep(&[], now + ChronoDuration::minutes(20)).await.unwrap();
    assert_eq!(after_grace.deleted, 1);
    assert_eq!(provider.delete_calls.load(Ordering::SeqCst), 1);
    assert!(provider.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn preserved_hostname_survives_indefinitely() {
    let provider = Arc::new(ScriptedProvider::new(features()));
    let cache = Arc::new(reconciler_core::RecordCache::new(
        provider.clone(),
        Duration::from_secs(3600),
    ));
    let tracker = Arc::new(InMemoryTracker::new());
    tracker.add_preserved("*.example.com").await.unwrap();
    let (tx, _rx) = broadcast::channel(16);
    let reconciler = Reconciler::new(provider.clone(), cache.clone(), tracker.clone(), tx.clone(), Some(2));
    let sweeper = OrphanSweeper::new(
        provider.clone(),
        cache,
        tracker,
        tx,
        ChronoDuration::minutes(15),
        true,
    );
    let operator = minimal_operator();

    reconciler
        .run_pass(&[a_record_spec("keepsake.example.com", "10.0.0.1")], &operator, None, None)
        .await
        .unwrap();

    let now = Utc::now();
    let report = sweeper.sweep(&[], now + ChronoDuration::days(365)).await.unwrap();
    assert_eq!(report.preserved, 1);
    assert_eq!(report.deleted, 0);
    assert_eq!(provider.delete_calls.load(Ordering::SeqCst), 0);
}
