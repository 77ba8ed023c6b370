//! Desired-state specs produced by source extractors, and the union
//! merge that resolves conflicting specs for the same hostname.

use crate::record::RecordType;
use serde::{Deserialize, Serialize};

/// Which extractor produced a `DesiredSpec`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Container,
    Router,
    Manual,
}

/// A hostname this system wants DNS content for, as produced by a source
/// extractor before provider-specific normalization (ttl clamping,
/// trailing dot, proxied flag).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredSpec {
    pub hostname: String,
    pub record_type: RecordType,
    /// `None` means "use the resolved public IP" for A/AAAA records.
    pub content: Option<String>,
    pub ttl: Option<u32>,
    pub proxied: Option<bool>,
    pub priority: Option<u16>,
    pub weight: Option<u16>,
    pub port: Option<u16>,
    pub flags: Option<u8>,
    pub tag: Option<String>,
    pub source: SourceKind,
    /// `false` marks a hostname as tracked-only: the reconciler must never
    /// create, update, or delete a record for it.
    pub managed: bool,
}

impl DesiredSpec {
    pub fn new(hostname: impl Into<String>, record_type: RecordType, source: SourceKind) -> Self {
        Self {
            hostname: hostname.into(),
            record_type,
            content: None,
            ttl: None,
            proxied: None,
            priority: None,
            weight: None,
            port: None,
            flags: None,
            tag: None,
            source,
            managed: true,
        }
    }

    /// Merge key: specs for the same (hostname, type) describe the same
    /// logical record regardless of source.
    fn merge_key(&self) -> (String, RecordType) {
        (self.hostname.to_ascii_lowercase(), self.record_type)
    }
}

/// Precedence when two extractors disagree on a (hostname, type) pair.
///
/// Container labels are considered authoritative over router rules: a
/// container's own `dns.*` labels describe intent the operator attached
/// directly to the workload, while router rules are derived from routing
/// configuration that may be broader than DNS intent (a catch-all rule
/// matching many hosts). Manual (preservation-list-adjacent) specs are
/// lowest precedence since they exist only to seed tracked-only entries.
fn precedence(kind: SourceKind) -> u8 {
    match kind {
        SourceKind::Container => 2,
        SourceKind::Router => 1,
        SourceKind::Manual => 0,
    }
}

/// Union-merge desired specs from multiple extractors, keyed by
/// `(hostname, record_type)`. Specs are combined field by field: a field
/// the higher-precedence source left unset does not erase a value a
/// lower-precedence source supplied — only fields both sources set
/// explicitly are decided by precedence. `source` and `managed` follow
/// the winning (highest-precedence-present) spec as a whole, since they
/// are not per-field attributes a source can leave unset.
pub fn merge_desired(sets: Vec<(SourceKind, Vec<DesiredSpec>)>) -> Vec<DesiredSpec> {
    use std::collections::HashMap;

    let mut merged: HashMap<(String, RecordType), DesiredSpec> = HashMap::new();
    for (_, specs) in sets {
        // Lowest precedence first so each later merge's `Some` fields
        // override, leaving an earlier source's field standing wherever
        // the later source left it `None`.
        let mut specs = specs;
        specs.sort_by_key(|s| precedence(s.source));
        for spec in specs {
            let key = spec.merge_key();
            match merged.remove(&key) {
                Some(existing) => {
                    merged.insert(key, merge_one(existing, spec));
                }
                None => {
                    merged.insert(key, spec);
                }
            }
        }
    }
    merged.into_values().collect()
}

/// Merge two specs for the same `(hostname, record_type)`: the
/// higher-precedence spec's explicit fields win; a field it left unset
/// falls back to the lower-precedence spec, regardless of which of the
/// two was merged in first.
fn merge_one(base: DesiredSpec, incoming: DesiredSpec) -> DesiredSpec {
    let (hi, lo) = if precedence(incoming.source) >= precedence(base.source) {
        (incoming, base)
    } else {
        (base, incoming)
    };
    DesiredSpec {
        hostname: hi.hostname,
        record_type: hi.record_type,
        content: hi.content.or(lo.content),
        ttl: hi.ttl.or(lo.ttl),
        proxied: hi.proxied.or(lo.proxied),
        priority: hi.priority.or(lo.priority),
        weight: hi.weight.or(lo.weight),
        port: hi.port.or(lo.port),
        flags: hi.flags.or(lo.flags),
        tag: hi.tag.or(lo.tag),
        source: hi.source,
        managed: hi.managed,
    }
}
