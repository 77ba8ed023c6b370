//! Provider Adapter: the trait every DNS backend implements, its
//! capability descriptor, and the shared normalization helpers providers
//! call before issuing a write.
//!
//! Trust level: untrusted. An adapter translates one zone's worth of
//! provider wire format into `Record`s and back; it must not retry,
//! cache, or schedule anything — all of that is owned by the reconciler
//! and the cache (C2/C5), exactly as the engine owns it in this system's
//! teacher lineage.

use crate::error::Result;
use crate::record::{Record, RecordType};
use async_trait::async_trait;

/// Per-provider capability/limits descriptor.
#[derive(Debug, Clone, Copy)]
pub struct Features {
    pub supports_proxied: bool,
    pub ttl_floor: u32,
    pub requires_trailing_dot: bool,
    pub supports_batch: bool,
}

/// A record spec after provider-specific normalization: TTL clamped to
/// the provider's floor, trailing dot applied or stripped, and `proxied`
/// zeroed out for providers that don't support it.
#[derive(Debug, Clone)]
pub struct NormalizedRecordSpec {
    pub zone: String,
    pub record_type: RecordType,
    pub name: String,
    pub content: String,
    pub ttl: u32,
    pub proxied: bool,
    pub priority: Option<u16>,
    pub weight: Option<u16>,
    pub port: Option<u16>,
    pub flags: Option<u8>,
    pub tag: Option<String>,
}

/// Apply a provider's `Features` to a record about to be created or
/// updated. Every provider crate calls this before building its wire
/// request so the clamping/trailing-dot/proxied rules live in one place.
#[allow(clippy::too_many_arguments)]
pub fn normalize(
    features: &Features,
    zone: &str,
    record_type: RecordType,
    name: &str,
    content: &str,
    ttl: u32,
    proxied: bool,
    priority: Option<u16>,
    weight: Option<u16>,
    port: Option<u16>,
    flags: Option<u8>,
    tag: Option<String>,
) -> NormalizedRecordSpec {
    let ttl = ttl.max(features.ttl_floor);
    let proxied = proxied && features.supports_proxied;
    let content = if features.requires_trailing_dot && needs_trailing_dot(record_type) {
        if content.ends_with('.') {
            content.to_string()
        } else {
            format!("{content}.")
        }
    } else {
        content.trim_end_matches('.').to_string()
    };
    NormalizedRecordSpec {
        zone: zone.to_string(),
        record_type,
        name: name.to_string(),
        content,
        ttl,
        proxied,
        priority,
        weight,
        port,
        flags,
        tag,
    }
}

fn needs_trailing_dot(record_type: RecordType) -> bool {
    matches!(
        record_type,
        RecordType::Cname | RecordType::Mx | RecordType::Ns | RecordType::Srv
    )
}

/// The DNS provider adapter contract Implementors handle exactly
/// one provider account/zone and perform no retry, caching, or
/// scheduling of their own.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider_name(&self) -> &'static str;
    fn capabilities(&self) -> Features;
    fn zone(&self) -> &str;

    /// Full listing of records currently in the zone. Called by the
    /// cache on refresh; the adapter does not cache this itself.
    async fn list_zone_records(&self) -> Result<Vec<Record>>;

    async fn create_record(&self, spec: &NormalizedRecordSpec) -> Result<Record>;
    async fn update_record(&self, id: &str, spec: &NormalizedRecordSpec) -> Result<Record>;
    async fn delete_record(&self, id: &str) -> Result<()>;
}

/// Factory for constructing a `ProviderAdapter` from JSON configuration.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn create(&self, config: serde_json::Value) -> Result<Box<dyn ProviderAdapter>>;
    fn type_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloudflare_features() -> Features {
        Features {
            supports_proxied: true,
            ttl_floor: 60,
            requires_trailing_dot: false,
            supports_batch: false,
        }
    }

    #[test]
    fn clamps_ttl_to_floor() {
        let spec = normalize(
            &cloudflare_features(),
            "zone",
            RecordType::A,
            "app.example.com",
            "1.2.3.4",
            1,
            true,
            None,
            None,
            None,
            None,
            None,
        );
        assert_eq!(spec.ttl, 60);
    }

    #[test]
    fn strips_proxied_when_unsupported() {
        let features = Features {
            supports_proxied: false,
            ttl_floor: 30,
            requires_trailing_dot: false,
            supports_batch: false,
        };
        let spec = normalize(
            &features,
            "zone",
            RecordType::A,
            "app.example.com",
            "1.2.3.4",
            300,
            true,
            None,
            None,
            None,
            None,
            None,
        );
        assert!(!spec.proxied);
    }

    #[test]
    fn applies_trailing_dot_for_cname_when_required() {
        let features = Features {
            supports_proxied: false,
            ttl_floor: 1,
            requires_trailing_dot: true,
            supports_batch: true,
        };
        let spec = normalize(
            &features,
            "zone",
            RecordType::Cname,
            "www.example.com",
            "example.com",
            300,
            false,
            None,
            None,
            None,
            None,
            None,
        );
        assert_eq!(spec.content, "example.com.");
    }

    #[test]
    fn leaves_a_record_content_without_trailing_dot() {
        let features = Features {
            supports_proxied: false,
            ttl_floor: 1,
            requires_trailing_dot: true,
            supports_batch: true,
        };
        let spec = normalize(
            &features,
            "zone",
            RecordType::A,
            "app.example.com",
            "1.2.3.4",
            300,
            false,
            None,
            None,
            None,
            None,
            None,
        );
        assert_eq!(spec.content, "1.2.3.4");
    }
}
