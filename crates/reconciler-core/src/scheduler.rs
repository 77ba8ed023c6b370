//! Event loop building blocks: the pause gate, the debounced change
//! trigger, and the public-IP resolver task. `engine.rs` composes these
//! into the actual `tokio::select!` loop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, info, warn};

/// How a concrete IP source resolves the host's current public address.
/// Semi-trusted: no retry or caching of its own — that's this module's job.
#[async_trait]
pub trait PublicIpResolver: Send + Sync {
    async fn resolve_v4(&self) -> Result<Option<Ipv4Addr>, crate::error::Error>;
    async fn resolve_v6(&self) -> Result<Option<Ipv6Addr>, crate::error::Error>;
}

const CONSECUTIVE_FAILURE_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, Default)]
pub struct PublicIpSnapshot {
    pub v4: Option<Ipv4Addr>,
    pub v6: Option<Ipv6Addr>,
    pub consecutive_failures: u32,
    pub unresolvable: bool,
}

/// Owns the cached public IPv4/IPv6, refreshed on its own timer,
/// independent of the reconciliation poll interval.
pub struct IpResolverTask {
    resolver: Arc<dyn PublicIpResolver>,
    state: Arc<RwLock<PublicIpSnapshot>>,
    refresh_interval: Duration,
}

impl IpResolverTask {
    pub fn new(resolver: Arc<dyn PublicIpResolver>, refresh_interval: Duration) -> Self {
        Self {
            resolver,
            state: Arc::new(RwLock::new(PublicIpSnapshot::default())),
            refresh_interval,
        }
    }

    pub fn snapshot_handle(&self) -> Arc<RwLock<PublicIpSnapshot>> {
        self.state.clone()
    }

    pub async fn current(&self) -> PublicIpSnapshot {
        self.state.read().await.clone()
    }

    /// One resolution attempt; updates the cached snapshot and the
    /// consecutive-failure counter. A resolver that errors on one family
    /// but not the other still makes progress on the family that
    /// succeeded.
    pub async fn refresh_once(&self) {
        let v4 = self.resolver.resolve_v4().await;
        let v6 = self.resolver.resolve_v6().await;
        let mut state = self.state.write().await;

        let mut any_ok = false;
        if let Ok(v4) = v4 {
            state.v4 = v4;
            any_ok = true;
        }
        if let Ok(v6) = v6 {
            state.v6 = v6;
            any_ok = true;
        }

        if any_ok {
            state.consecutive_failures = 0;
            state.unresolvable = false;
        } else {
            state.consecutive_failures += 1;
            if state.consecutive_failures >= CONSECUTIVE_FAILURE_THRESHOLD && !state.unresolvable {
                state.unresolvable = true;
                warn!(
                    consecutive_failures = state.consecutive_failures,
                    "public IP resolver has failed repeatedly; specs needing implicit content are unresolvable"
                );
            }
        }
    }

    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.refresh_interval);
            loop {
                ticker.tick().await;
                self.refresh_once().await;
            }
        })
    }
}

/// Pause/resume admin gate. The core only consumes this: an external
/// REST/WS layer (out of scope here) would be the thing calling
/// `pause`/`resume` in response to an operator action.
#[derive(Debug, Clone, Default)]
pub struct PauseState {
    pub paused: bool,
    pub reason: Option<String>,
    pub until: Option<DateTime<Utc>>,
}

pub struct PauseGate {
    tx: watch::Sender<PauseState>,
    rx: watch::Receiver<PauseState>,
}

impl PauseGate {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(PauseState::default());
        Self { tx, rx }
    }

    pub fn subscribe(&self) -> watch::Receiver<PauseState> {
        self.rx.clone()
    }

    pub fn pause(&self, reason: impl Into<String>, until: Option<DateTime<Utc>>) {
        let reason = reason.into();
        info!(reason = %reason, ?until, "pausing reconciliation");
        let _ = self.tx.send(PauseState {
            paused: true,
            reason: Some(reason),
            until,
        });
    }

    pub fn resume(&self) {
        info!("resuming reconciliation");
        let _ = self.tx.send(PauseState::default());
    }

    pub fn is_paused(&self) -> bool {
        let state = self.rx.borrow();
        if !state.paused {
            return false;
        }
        match state.until {
            Some(until) => Utc::now() < until,
            None => true,
        }
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Collapses a burst of change signals (container start/stop events)
/// into a single reconciliation trigger after `window` of quiet,
/// instead of running a pass per raw event.
pub struct Debouncer {
    tx: mpsc::UnboundedSender<()>,
}

impl Debouncer {
    /// Returns the debouncer plus a receiver that yields once per
    /// quiet window following one or more `notify()` calls.
    pub fn new(window: Duration) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<()>();
        let (debounced_tx, debounced_rx) = mpsc::unbounded_channel::<()>();

        tokio::spawn(async move {
            loop {
                // Wait for the first signal of a new burst.
                if raw_rx.recv().await.is_none() {
                    return;
                }
                // Drain anything else that arrives within the window.
                loop {
                    match tokio::time::timeout(window, raw_rx.recv()).await {
                        Ok(Some(())) => continue,
                        Ok(None) => return,
                        Err(_) => break,
                    }
                }
                debug!("debounce window elapsed, emitting trigger");
                if debounced_tx.send(()).is_err() {
                    return;
                }
            }
        });

        (Self { tx: raw_tx }, debounced_rx)
    }

    pub fn notify(&self) {
        let _ = self.tx.send(());
    }

    pub fn handle(&self) -> mpsc::UnboundedSender<()> {
        self.tx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFails;

    #[async_trait]
    impl PublicIpResolver for AlwaysFails {
        async fn resolve_v4(&self) -> Result<Option<Ipv4Addr>, crate::error::Error> {
            Err(crate::error::Error::validation("no network"))
        }
        async fn resolve_v6(&self) -> Result<Option<Ipv6Addr>, crate::error::Error> {
            Err(crate::error::Error::validation("no network"))
        }
    }

    struct AlwaysSucceeds;

    #[async_trait]
    impl PublicIpResolver for AlwaysSucceeds {
        async fn resolve_v4(&self) -> Result<Option<Ipv4Addr>, crate::error::Error> {
            Ok(Some(Ipv4Addr::new(1, 2, 3, 4)))
        }
        async fn resolve_v6(&self) -> Result<Option<Ipv6Addr>, crate::error::Error> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn marks_unresolvable_after_threshold() {
        let task = IpResolverTask::new(Arc::new(AlwaysFails), Duration::from_secs(60));
        for _ in 0..CONSECUTIVE_FAILURE_THRESHOLD {
            task.refresh_once().await;
        }
        assert!(task.current().await.unresolvable);
    }

    #[tokio::test]
    async fn success_resets_failure_counter() {
        let task = IpResolverTask::new(Arc::new(AlwaysSucceeds), Duration::from_secs(60));
        task.refresh_once().await;
        let snapshot = task.current().await;
        assert_eq!(snapshot.v4, Some(Ipv4Addr::new(1, 2, 3, 4)));
        assert_eq!(snapshot.consecutive_failures, 0);
        assert!(!snapshot.unresolvable);
    }

    #[tokio::test]
    async fn pause_gate_respects_expiry() {
        let gate = PauseGate::new();
        gate.pause("maintenance", Some(Utc::now() - chrono::Duration::seconds(1)));
        assert!(!gate.is_paused());
    }

    #[tokio::test]
    async fn pause_gate_without_expiry_stays_paused() {
        let gate = PauseGate::new();
        gate.pause("maintenance", None);
        assert!(gate.is_paused());
        gate.resume();
        assert!(!gate.is_paused());
    }

    #[tokio::test]
    async fn debouncer_collapses_burst_into_one_trigger() {
        let (debouncer, mut rx) = Debouncer::new(Duration::from_millis(50));
        debouncer.notify();
        debouncer.notify();
        debouncer.notify();
        tokio::time::sleep(Duration::from_millis(150)).await;
        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 1);
    }
}
