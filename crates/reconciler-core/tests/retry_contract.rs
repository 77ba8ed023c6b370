//! Contract: transient provider failures are retried and eventually
//! succeed; errors outside the transient/rate-limited kinds surface to
//! the caller on the first attempt without being retried.

mod common;

use common::{a_record_spec, minimal_operator, ScriptedProvider};
use reconciler_core::provider::Features;
use reconciler_core::tracker::InMemoryTracker;
use reconciler_core::{ErrorKind, Reconciler};
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
async fn transient_failure_is_retried_until_it_succeeds() {
    let provider = Arc::new(ScriptedProvider::new(features()));
    provider.script_failure(ErrorKind::Transient);

    let cache = Arc::new(reconciler_core::RecordCache::new(
        provider.clone(),
        Duration::from_secs(3600),
    ));
    let tracker = Arc::new(InMemoryTracker::new());
    let (tx, _rx) = broadcast::channel(16);
    let reconciler = Reconciler::new(provider.clone(), cache, tracker, tx, Some(1));
    let operator = minimal_operator();

    let report = reconciler
        .run_pass(&[a_record_spec("app.example.com", "10.0.0.1")], &operator, None, None)
        .await
        .unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.errors, 0);
    assert_eq!(provider.create_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn auth_failure_surfaces_without_retry() {
    let provider = Arc::new(ScriptedProvider::new(features()));
    provider.script_failure(ErrorKind::Auth);

    let cache = Arc::new(reconciler_core::RecordCache::new(
        provider.clone(),
        Duration::from_secs(3600),
    ));
    let tracker = Arc::new(InMemoryTracker::new());
    let (tx, _rx) = broadcast::channel(16);
    let reconciler = Reconciler::new(provider.clone(), cache, tracker, tx, Some(1));
    let operator = minimal_operator();

    let report = reconciler
        .run_pass(&[a_record_spec("app.example.com", "10.0.0.1")], &operator, None, None)
        .await
        .unwrap();

    assert_eq!(report.created, 0);
    assert_eq!(report.errors, 1);
    // Exactly one attempt: the scripted failure was consumed and not retried.
    assert_eq!(provider.create_calls.load(Ordering::SeqCst), 0);
    assert!(provider.fail_next.lock().unwrap().is_empty());
}
