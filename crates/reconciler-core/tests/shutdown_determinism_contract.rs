//! Contract: the engine's event loop stops promptly and deterministically
//! when its shutdown receiver fires, regardless of the poll interval, and
//! `force_cleanup()` can drive a sweep without waiting for a full cycle.

mod common;

use common::{minimal_operator, StaticExtractor};
use reconciler_core::provider::{Features, NormalizedRecordSpec};
use reconciler_core::record::Record;
use reconciler_core::{Engine, ProviderAdapter, Result};
use reconciler_core::tracker::InMemoryTracker;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

struct IdleProvider;

#[async_trait]
impl ProviderAdapter for IdleProvider {
    fn provider_name(&self) -> &'static str {
        "idle"
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
    async fn create_record(&self, _spec: &NormalizedRecordSpec) -> Result<Record> {
        unimplemented!("idle provider issues no mutations in this contract")
    }
    async fn update_record(&self, _id: &str, _spec: &NormalizedRecordSpec) -> Result<Record> {
        unimplemented!("idle provider issues no mutations in this contract")
    }
    async fn delete_record(&self, _id: &str) -> Result<()> {
        Ok(())
    }
}

fn long_poll_operator() -> reconciler_core::OperatorConfig {
    let mut operator = minimal_operator();
    operator.poll_interval_secs = 3600;
    operator
}

#[tokio::test]
async fn shutdown_signal_stops_the_loop_well_before_the_poll_interval() {
    let provider = Arc::new(IdleProvider);
    let tracker = Arc::new(InMemoryTracker::new());
    let engine = Arc::new(Engine::new(
        provider,
        tracker,
        vec![Arc::new(StaticExtractor(vec![]))],
        None,
        long_poll_operator(),
        None,
    ));

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let engine_clone = engine.clone();
    let handle = tokio::spawn(async move { engine_clone.run_with_shutdown(shutdown_rx).await });

    shutdown_tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("engine should stop well within the timeout, not wait for the 1-hour poll tick");
    assert!(result.unwrap().is_ok());
}

#[tokio::test]
async fn force_cleanup_does_not_require_the_loop_to_be_running() {
    let provider = Arc::new(IdleProvider);
    let tracker = Arc::new(InMemoryTracker::new());
    let engine = Engine::new(
        provider,
        tracker,
        vec![Arc::new(StaticExtractor(vec![]))],
        None,
        long_poll_operator(),
        None,
    );
    let report = engine.force_cleanup().await.unwrap();
    assert_eq!(report.deleted, 0);
    assert_eq!(report.preserved, 0);
}
