//! Contract: a reconciliation pass is idempotent. Running the same
//! desired set twice in a row issues exactly one create and zero further
//! provider mutations on the second pass.

mod common;

use common::{a_record_spec, minimal_operator, ScriptedProvider};
use reconciler_core::provider::Features;
use reconciler_core::tracker::InMemoryTracker;
use reconciler_core::Reconciler;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn cloudflare_features() -> Features {
    Features {
        supports_proxied: true,
        ttl_floor: 60,
        requires_trailing_dot: false,
        supports_batch: false,
    }
}

#[tokio::test]
async fn second_pass_over_same_desired_set_is_a_noop() {
    let provider = Arc::new(ScriptedProvider::new(cloudflare_features()));
    let cache = Arc::new(reconciler_core::RecordCache::new(
        provider.clone(),
        Duration::from_secs(3600),
    ));
    let tracker = Arc::new(InMemoryTracker::new());
    let (tx, _rx) = broadcast::channel(16);
    let reconciler = Reconciler::new(provider.clone(), cache, tracker, tx, Some(4));
    let operator = minimal_operator();
    let desired = vec![a_record_spec("app.example.com", "10.0.0.1")];

    let first = reconciler.run_pass(&desired, &operator, None, None).await.unwrap();
    assert_eq!(first.created, 1);
    assert_eq!(first.updated, 0);

    let second = reconciler.run_pass(&desired, &operator, None, None).await.unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.unchanged, 1);
    assert_eq!(provider.create_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn content_change_triggers_update_not_a_new_record() {
    let provider = Arc::new(ScriptedProvider::new(cloudflare_features()));
    let cache = Arc::new(reconciler_core::RecordCache::new(
        provider.clone(),
        Duration::from_secs(3600),
    ));
    let tracker = Arc::new(InMemoryTracker::new());
    let (tx, _rx) = broadcast::channel(16);
    let reconciler = Reconciler::new(provider.clone(), cache.clone(), tracker, tx, Some(4));
    let operator = minimal_operator();

    reconciler
        .run_pass(&[a_record_spec("app.example.com", "10.0.0.1")], &operator, None, None)
        .await
        .unwrap();

    // Force a cache refresh on the next pass to pick up the created record.
    cache.refresh(true).await.unwrap();

    let report = reconciler
        .run_pass(&[a_record_spec("app.example.com", "10.0.0.2")], &operator, None, None)
        .await
        .unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.created, 0);
    assert_eq!(provider.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(provider.update_calls.load(Ordering::SeqCst), 1);

    let records = provider.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].content, "10.0.0.2");
}
