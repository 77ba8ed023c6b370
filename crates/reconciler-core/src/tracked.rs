//! Tracked-entry bookkeeping (C3 data shape) and the preservation list.

use crate::record::RecordKey;
use crate::spec::SourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A record this system has created or adopted, with the bookkeeping the
/// orphan sweeper needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEntry {
    pub key: RecordKey,
    pub first_seen: DateTime<Utc>,
    pub last_confirmed: DateTime<Utc>,
    /// Set the first time a reconciliation pass no longer finds a desired
    /// spec for this key; cleared if the spec reappears before the grace
    /// period elapses.
    pub orphaned_since: Option<DateTime<Utc>>,
    pub source: SourceKind,
}

impl TrackedEntry {
    pub fn new(key: RecordKey, source: SourceKind, now: DateTime<Utc>) -> Self {
        Self {
            key,
            first_seen: now,
            last_confirmed: now,
            orphaned_since: None,
            source,
        }
    }

    pub fn is_orphaned(&self) -> bool {
        self.orphaned_since.is_some()
    }
}

/// Hostnames the orphan sweeper must never delete, even if untracked and
/// undesired. Patterns are glob-like: a leading `*.` matches any single
/// label prefix, case-insensitively.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreservationList {
    patterns: Vec<String>,
}

impl PreservationList {
    pub fn new(patterns: Vec<String>) -> Self {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn add(&mut self, pattern: impl Into<String>) {
        let pattern = pattern.into().to_ascii_lowercase();
        if !self.patterns.contains(&pattern) {
            self.patterns.push(pattern);
        }
    }

    pub fn remove(&mut self, pattern: &str) {
        let pattern = pattern.to_ascii_lowercase();
        self.patterns.retain(|p| p != &pattern);
    }

    /// Whether `hostname` matches any preserved pattern.
    ///
    /// A pattern of `*.suffix` matches any hostname ending in `.suffix`
    /// (including multi-label prefixes, matching the wildcard DNS record
    /// convention rather than a single-label glob). A pattern with no `*`
    /// matches only that exact hostname.
    pub fn matches(&self, hostname: &str) -> bool {
        let hostname = hostname.to_ascii_lowercase();
        self.patterns.iter().any(|pattern| {
            if let Some(suffix) = pattern.strip_prefix("*.") {
                hostname == suffix || hostname.ends_with(&format!(".{suffix}"))
            } else {
                &hostname == pattern
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_any_subdomain() {
        let list = PreservationList::new(vec!["*.internal.example.com".to_string()]);
        assert!(list.matches("a.internal.example.com"));
        assert!(list.matches("deep.a.internal.example.com"));
        assert!(list.matches("INTERNAL.EXAMPLE.COM"));
        assert!(!list.matches("internal.example.org"));
    }

    #[test]
    fn exact_pattern_matches_only_itself() {
        let list = PreservationList::new(vec!["legacy.example.com".to_string()]);
        assert!(list.matches("legacy.example.com"));
        assert!(!list.matches("other.legacy.example.com"));
    }
}
