//! Reconciler: the pass algorithm that diffs desired specs against
//! the cached zone, issues provider mutations, and keeps the tracker
//! current. One pass runs at a time (`pass_lock`), and within a pass
//! mutations execute with bounded concurrency (`Arc<Semaphore>`): a
//! semaphore-gated `tokio::spawn` per unit of work.

use crate::cache::{CacheWrite, RecordCache};
use crate::config::{clamp_to_features, resolve_effective, OperatorConfig};
use crate::error::{Error, Result};
use crate::events::EngineEvent;
use crate::provider::{self, NormalizedRecordSpec, ProviderAdapter};
use crate::record::{fingerprint, Record, RecordKey, RecordType};
use crate::retry::{classify, RetryDecision};
use crate::spec::DesiredSpec;
use crate::tracker::Tracker;
use chrono::Utc;
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MutationKind {
    Create,
    Update,
    NoOp,
}

/// Dispatch order within a pass: creates, then updates, then no-ops
/// (which issue no provider call and so have no ordering requirement of
/// their own).
fn mutation_rank(kind: MutationKind) -> u8 {
    match kind {
        MutationKind::Create => 0,
        MutationKind::Update => 1,
        MutationKind::NoOp => 2,
    }
}

struct Mutation {
    key: RecordKey,
    kind: MutationKind,
    spec: NormalizedRecordSpec,
    existing_id: Option<String>,
}

/// Summary of one reconciliation pass, returned to the caller (the event
/// loop, C7) and used to populate `EngineEvent::ReconcileFinished`.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub errors: usize,
}

pub struct Reconciler {
    provider: Arc<dyn ProviderAdapter>,
    cache: Arc<RecordCache>,
    tracker: Arc<dyn Tracker>,
    concurrency: Arc<Semaphore>,
    pass_lock: Mutex<()>,
    events: broadcast::Sender<EngineEvent>,
}

impl Reconciler {
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        cache: Arc<RecordCache>,
        tracker: Arc<dyn Tracker>,
        events: broadcast::Sender<EngineEvent>,
        concurrency: Option<usize>,
    ) -> Self {
        Self {
            provider,
            cache,
            tracker,
            concurrency: Arc::new(Semaphore::new(concurrency.unwrap_or(DEFAULT_CONCURRENCY))),
            pass_lock: Mutex::new(()),
            events: events.clone(),
        }
    }

    /// Run one reconciliation pass. Only one pass runs at a time; a
    /// concurrent caller blocks on `pass_lock` until the in-flight pass
    /// finishes rather than racing cache writes.
    pub async fn run_pass(
        &self,
        desired: &[DesiredSpec],
        operator: &OperatorConfig,
        public_v4: Option<Ipv4Addr>,
        public_v6: Option<Ipv6Addr>,
    ) -> Result<PassReport> {
        let _guard = self.pass_lock.lock().await;
        let now = Utc::now();
        let _ = self.events.send(EngineEvent::ReconcileStarted { at: now });

        let current = self.cache.get(None).await?;
        let mut index: HashMap<(RecordType, String), &Record> = HashMap::new();
        for record in &current {
            index.insert((record.record_type, record.name.to_ascii_lowercase()), record);
        }

        let features = self.provider.capabilities();
        let zone = self.provider.zone().to_string();
        let provider_name = self.provider.provider_name();

        let mut mutations = Vec::new();
        for spec in desired {
            let name = spec.hostname.to_ascii_lowercase();

            if !spec.managed {
                if let Some(existing) = index.get(&(spec.record_type, name.clone())) {
                    let key = fingerprint(provider_name, &zone, existing);
                    self.tracker.track(&key, spec.source, now).await?;
                    self.tracker.confirm(&key, now).await?;
                }
                continue;
            }

            let content = match resolve_content(spec, public_v4, public_v6) {
                Ok(c) => c,
                Err(e) => {
                    warn!(hostname = %spec.hostname, error = %e, "skipping spec: unresolvable content");
                    continue;
                }
            };

            let effective = clamp_to_features(&resolve_effective(spec, operator), &features);
            let normalized = provider::normalize(
                &features,
                &zone,
                spec.record_type,
                &name,
                &content,
                effective.ttl,
                effective.proxied,
                spec.priority,
                spec.weight,
                spec.port,
                spec.flags,
                spec.tag.clone(),
            );

            let discriminator = crate::record::content_discriminator(
                normalized.record_type,
                &normalized.content,
                normalized.priority,
                normalized.weight,
                normalized.port,
                normalized.flags,
                normalized.tag.as_deref(),
            );
            let key = RecordKey {
                provider: provider_name.to_string(),
                zone: zone.clone(),
                record_type: normalized.record_type,
                name: name.clone(),
                discriminator,
            };

            match index.get(&(spec.record_type, name.clone())) {
                Some(existing) => {
                    let existing_key = fingerprint(provider_name, &zone, existing);
                    let attrs_match = existing.ttl == normalized.ttl && existing.proxied == normalized.proxied;
                    let kind = if existing_key.discriminator == key.discriminator && attrs_match {
                        MutationKind::NoOp
                    } else {
                        MutationKind::Update
                    };
                    mutations.push(Mutation {
                        key,
                        kind,
                        spec: normalized,
                        existing_id: Some(existing.id.clone()),
                    });
                }
                None => mutations.push(Mutation {
                    key,
                    kind: MutationKind::Create,
                    spec: normalized,
                    existing_id: None,
                }),
            }
        }

        // Creates before updates, stable-ordered by (type, name) within
        // each class, per §4.5/§5's ordering guarantee. Deletes are not
        // issued here at all — only the sweeper (C6) issues them.
        mutations.sort_by(|a, b| {
            mutation_rank(a.kind)
                .cmp(&mutation_rank(b.kind))
                .then_with(|| a.key.record_type.to_string().cmp(&b.key.record_type.to_string()))
                .then_with(|| a.key.name.cmp(&b.key.name))
        });

        let mut report = PassReport::default();
        let mut join_set: JoinSet<(MutationKind, RecordKey, Result<()>)> = JoinSet::new();

        for mutation in mutations {
            let permit = self.concurrency.clone();
            let provider = self.provider.clone();
            let cache = self.cache.clone();
            let tracker = self.tracker.clone();
            let source = desired
                .iter()
                .find(|s| s.hostname.eq_ignore_ascii_case(&mutation.key.name))
                .map(|s| s.source)
                .unwrap_or(crate::spec::SourceKind::Manual);

            join_set.spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore not closed");
                let kind = mutation.kind;
                let key = mutation.key.clone();
                let result = execute_mutation(provider, cache, tracker, mutation, source, now).await;
                (kind, key, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            let (kind, key, result) = joined.map_err(|e| Error::internal(format!("mutation task panicked: {e}")))?;
            match result {
                Ok(()) => match kind {
                    MutationKind::Create => {
                        report.created += 1;
                        let _ = self.events.send(EngineEvent::RecordCreated { key });
                    }
                    MutationKind::Update => {
                        report.updated += 1;
                        let _ = self.events.send(EngineEvent::RecordUpdated { key });
                    }
                    MutationKind::NoOp => report.unchanged += 1,
                },
                Err(e) => {
                    report.errors += 1;
                    error!(key = %key, error = %e.redacted(), "mutation failed after retries");
                }
            }
        }

        info!(
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            errors = report.errors,
            "reconciliation pass finished"
        );
        let _ = self.events.send(EngineEvent::ReconcileFinished {
            at: Utc::now(),
            created: report.created,
            updated: report.updated,
            unchanged: report.unchanged,
            errors: report.errors,
        });

        Ok(report)
    }
}

async fn execute_mutation(
    provider: Arc<dyn ProviderAdapter>,
    cache: Arc<RecordCache>,
    tracker: Arc<dyn Tracker>,
    mutation: Mutation,
    source: crate::spec::SourceKind,
    now: chrono::DateTime<Utc>,
) -> Result<()> {
    match mutation.kind {
        MutationKind::NoOp => {
            tracker.confirm(&mutation.key, now).await?;
            return Ok(());
        }
        MutationKind::Create => {
            let record = retry_call(&mutation.key, |attempt| {
                let provider = provider.clone();
                let spec = mutation.spec.clone();
                async move {
                    debug!(record_type = %spec.record_type, name = %spec.name, attempt, "creating record");
                    provider.create_record(&spec).await
                }
            })
            .await?;
            cache.apply(CacheWrite::Insert(record)).await;
            tracker.track(&mutation.key, source, now).await?;
            tracker.confirm(&mutation.key, now).await?;
        }
        MutationKind::Update => {
            let id = mutation.existing_id.clone().ok_or_else(|| {
                Error::internal("update mutation missing existing record id")
            })?;
            let update_result = retry_call(&mutation.key, |attempt| {
                let provider = provider.clone();
                let spec = mutation.spec.clone();
                let id = id.clone();
                async move {
                    debug!(id = %id, attempt, "updating record");
                    provider.update_record(&id, &spec).await
                }
            })
            .await;

            // NotFoundError on update falls back to create: the cache's
            // view of `id` is stale (the record was deleted out of band),
            // so the record this pass wants now simply doesn't exist yet.
            let record = match update_result {
                Ok(record) => record,
                Err(e) if e.kind() == Some(crate::error::ErrorKind::NotFound) => {
                    warn!(key = %mutation.key, "update target missing, falling back to create");
                    retry_call(&mutation.key, |attempt| {
                        let provider = provider.clone();
                        let spec = mutation.spec.clone();
                        async move {
                            debug!(record_type = %spec.record_type, name = %spec.name, attempt, "creating record (update fallback)");
                            provider.create_record(&spec).await
                        }
                    })
                    .await?
                }
                Err(e) => return Err(e),
            };
            cache.apply(CacheWrite::Replace(record)).await;
            tracker.track(&mutation.key, source, now).await?;
            tracker.confirm(&mutation.key, now).await?;
        }
    }
    Ok(())
}

/// Run `f` with the engine's retry policy, classifying each failure by
/// `ErrorKind` and sleeping between attempts per `crate::retry`.
async fn retry_call<F, Fut, T>(key: &RecordKey, mut f: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match f(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => match classify(&err, attempt) {
                RetryDecision::Retry(delay) => {
                    warn!(key = %key, attempt, delay_ms = delay.as_millis(), error = %err.redacted(), "retrying after provider error");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::Surface => return Err(err),
            },
        }
    }
}

/// Resolve a spec's content: explicit content wins, otherwise A/AAAA fall
/// back to the resolved public IP. Any other type with no explicit
/// content is a validation error — there is no implicit content for
/// CNAME/MX/TXT/SRV/CAA/NS.
fn resolve_content(
    spec: &DesiredSpec,
    public_v4: Option<Ipv4Addr>,
    public_v6: Option<Ipv6Addr>,
) -> Result<String> {
    if let Some(content) = &spec.content {
        return Ok(content.clone());
    }
    match spec.record_type {
        RecordType::A => public_v4
            .map(|ip| ip.to_string())
            .ok_or_else(|| Error::validation("public IPv4 not yet resolved")),
        RecordType::Aaaa => public_v6
            .map(|ip| ip.to_string())
            .ok_or_else(|| Error::validation("public IPv6 not yet resolved")),
        other => Err(Error::validation(format!(
            "{other} record for {} has no content and no implicit default",
            spec.hostname
        ))),
    }
}
