//! Cloudflare DNS provider adapter
//!
//! Trust level: untrusted. This adapter performs exactly the HTTP calls
//! `ProviderAdapter` asks for and nothing else — no retry, no backoff, no
//! caching, no background tasks. All of that is owned by the reconciler
//! and the cache (`reconciler-core`), matching this system's teacher
//! lineage's provider/engine trust split.
//!
//! ## Security
//!
//! The API token is never logged: the `Debug` impl redacts it, and every
//! error message is passed through `reconciler_core::error::redact`
//! before being surfaced.

use async_trait::async_trait;
use reconciler_core::error::{redact, Error, ErrorKind};
use reconciler_core::provider::{Features, NormalizedRecordSpec, ProviderAdapter, ProviderFactory};
use reconciler_core::record::{Record, RecordType};
use reconciler_core::Result;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct CloudflareProvider {
    api_token: String,
    zone_id: String,
    domain: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<redacted>")
            .field("zone_id", &self.zone_id)
            .field("domain", &self.domain)
            .finish()
    }
}

impl CloudflareProvider {
    /// `zone_id` is resolved once at construction time (either the
    /// operator's configured id, or looked up by `domain`), not on every
    /// call — the zone a provider instance serves does not change during
    /// its lifetime.
    pub async fn connect(
        api_token: impl Into<String>,
        zone_id: Option<String>,
        domain: impl Into<String>,
    ) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.trim().is_empty() {
            return Err(Error::config("cloudflare api_token must not be empty"));
        }
        let domain = domain.into();
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("failed to build http client: {e}")))?;

        let zone_id = match zone_id {
            Some(id) => id,
            None => lookup_zone_id(&client, &api_token, &domain).await?,
        };

        Ok(Self {
            api_token,
            zone_id,
            domain,
            client,
        })
    }

    fn records_url(&self) -> String {
        format!("{CLOUDFLARE_API_BASE}/zones/{}/dns_records", self.zone_id)
    }

    fn record_url(&self, id: &str) -> String {
        format!("{}/{}", self.records_url(), id)
    }

    /// A create that got a 409 "already exists" may simply mean a prior
    /// partial-failure run got the record created but never saw the
    /// response. List the zone and see whether a record with the same
    /// name/type/content discriminator already exists; if so, the create
    /// is treated as a success rather than a surfaced conflict.
    async fn find_matching(&self, spec: &NormalizedRecordSpec) -> Result<Option<Record>> {
        use reconciler_core::record::content_discriminator;
        let wanted = content_discriminator(
            spec.record_type,
            &spec.content,
            spec.priority,
            spec.weight,
            spec.port,
            spec.flags,
            spec.tag.as_deref(),
        );
        let records = self.list_zone_records().await?;
        Ok(records.into_iter().find(|r| {
            r.record_type == spec.record_type
                && r.name.eq_ignore_ascii_case(&spec.name)
                && content_discriminator(r.record_type, &r.content, r.priority, r.weight, r.port, r.flags, r.tag.as_deref())
                    == wanted
        }))
    }
}

#[async_trait]
impl ProviderAdapter for CloudflareProvider {
    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }

    fn capabilities(&self) -> Features {
        Features {
            supports_proxied: true,
            ttl_floor: 60,
            requires_trailing_dot: false,
            supports_batch: false,
        }
    }

    fn zone(&self) -> &str {
        &self.domain
    }

    async fn list_zone_records(&self) -> Result<Vec<Record>> {
        let mut page = 1u32;
        let mut records = Vec::new();
        loop {
            let url = format!("{}?page={page}&per_page=100", self.records_url());
            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.api_token)
                .send()
                .await
                .map_err(transient_error)?;
            let body: CloudflareListResponse = parse_response(response).await?;
            let returned = body.result.len();
            records.extend(body.result.into_iter().map(wire_to_record));
            if returned < 100 {
                break;
            }
            page += 1;
        }
        Ok(records)
    }

    async fn create_record(&self, spec: &NormalizedRecordSpec) -> Result<Record> {
        let payload = spec_to_wire(spec);
        let response = self
            .client
            .post(self.records_url())
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(transient_error)?;
        match parse_response::<CloudflareRecordResponse>(response).await {
            Ok(body) => Ok(wire_to_record(body.result)),
            Err(e) if e.kind() == Some(ErrorKind::Conflict) => {
                match self.find_matching(spec).await? {
                    Some(existing) => Ok(existing),
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn update_record(&self, id: &str, spec: &NormalizedRecordSpec) -> Result<Record> {
        let payload = spec_to_wire(spec);
        let response = self
            .client
            .put(self.record_url(id))
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(transient_error)?;
        let body: CloudflareRecordResponse = parse_response(response).await?;
        Ok(wire_to_record(body.result))
    }

    async fn delete_record(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.record_url(id))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(transient_error)?;
        let _: CloudflareDeleteResponse = parse_response(response).await?;
        Ok(())
    }
}

async fn lookup_zone_id(client: &reqwest::Client, api_token: &str, domain: &str) -> Result<String> {
    let url = format!("{CLOUDFLARE_API_BASE}/zones?name={domain}");
    let response = client
        .get(&url)
        .bearer_auth(api_token)
        .send()
        .await
        .map_err(transient_error)?;
    let body: CloudflareListResponse = parse_response(response).await?;
    body.result
        .into_iter()
        .next()
        .map(|z| z.id)
        .ok_or_else(|| Error::provider("cloudflare", ErrorKind::NotFound, format!("zone not found for domain {domain}")))
}

fn transient_error(e: reqwest::Error) -> Error {
    Error::provider("cloudflare", ErrorKind::Transient, redact(&e.to_string()))
}

/// Map an HTTP status to the closed `ErrorKind` taxonomy, then parse the
/// body into `T` on success.
async fn parse_response<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let kind = match status.as_u16() {
            401 | 403 => ErrorKind::Auth,
            404 => ErrorKind::NotFound,
            409 => ErrorKind::Conflict,
            429 => ErrorKind::RateLimited,
            500..=599 => ErrorKind::Transient,
            _ => ErrorKind::Validation,
        };
        return Err(Error::provider("cloudflare", kind, format!("{status}: {}", redact(&text))));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| Error::provider("cloudflare", ErrorKind::Validation, format!("invalid response body: {e}")))
}

#[derive(Deserialize)]
struct CloudflareListResponse {
    result: Vec<CloudflareRecordOrZone>,
}

#[derive(Deserialize)]
struct CloudflareRecordResponse {
    result: CloudflareRecordOrZone,
}

#[derive(Deserialize)]
struct CloudflareDeleteResponse {
    #[allow(dead_code)]
    result: Option<Value>,
}

/// Covers both the `/dns_records` and `/zones` response shapes: `id` is
/// common to both, the DNS-specific fields are optional so a zone lookup
/// response deserializes without error.
#[derive(Deserialize)]
struct CloudflareRecordOrZone {
    id: String,
    #[serde(default)]
    #[serde(rename = "type")]
    record_type: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    ttl: Option<u32>,
    #[serde(default)]
    proxied: Option<bool>,
    #[serde(default)]
    priority: Option<u16>,
    #[serde(default)]
    data: Option<CloudflareRecordData>,
}

#[derive(Deserialize, Default)]
struct CloudflareRecordData {
    #[serde(default)]
    weight: Option<u16>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    flags: Option<u8>,
    #[serde(default)]
    tag: Option<String>,
}

fn wire_to_record(wire: CloudflareRecordOrZone) -> Record {
    let data = wire.data.unwrap_or_default();
    Record {
        id: wire.id,
        zone: String::new(),
        record_type: wire
            .record_type
            .as_deref()
            .and_then(|t| t.parse().ok())
            .unwrap_or(RecordType::A),
        name: wire.name.unwrap_or_default(),
        content: wire.content.unwrap_or_default(),
        ttl: wire.ttl.unwrap_or(1),
        proxied: wire.proxied.unwrap_or(false),
        priority: wire.priority,
        weight: data.weight,
        port: data.port,
        flags: data.flags,
        tag: data.tag,
    }
}

fn spec_to_wire(spec: &NormalizedRecordSpec) -> Value {
    let mut payload = serde_json::json!({
        "type": spec.record_type.to_string(),
        "name": spec.name,
        "content": spec.content,
        "ttl": spec.ttl,
        "proxied": spec.proxied,
    });
    if let Some(priority) = spec.priority {
        payload["priority"] = Value::from(priority);
    }
    payload
}

/// Factory constructing a `CloudflareProvider` from the JSON form of
/// `reconciler_core::config::DnsProviderConfig::Cloudflare`.
pub struct CloudflareFactory;

#[derive(Deserialize)]
struct CloudflareFactoryConfig {
    api_token: String,
    zone_id: Option<String>,
    domain: String,
}

#[async_trait]
impl ProviderFactory for CloudflareFactory {
    async fn create(&self, config: Value) -> Result<Box<dyn ProviderAdapter>> {
        let parsed: CloudflareFactoryConfig = serde_json::from_value(config)
            .map_err(|e| Error::config(format!("invalid cloudflare provider config: {e}")))?;
        let provider = CloudflareProvider::connect(parsed.api_token, parsed.zone_id, parsed.domain).await?;
        Ok(Box::new(provider))
    }

    fn type_name(&self) -> &'static str {
        "cloudflare"
    }
}

pub fn register(registry: &reconciler_core::Registry) {
    registry.register_provider("cloudflare", std::sync::Arc::new(CloudflareFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconciler_core::provider::normalize;

    #[test]
    fn wire_record_without_data_defaults_weight_and_port_to_none() {
        let wire = CloudflareRecordOrZone {
            id: "1".into(),
            record_type: Some("A".into()),
            name: Some("app.example.com".into()),
            content: Some("1.2.3.4".into()),
            ttl: Some(300),
            proxied: Some(true),
            priority: None,
            data: None,
        };
        let record = wire_to_record(wire);
        assert_eq!(record.record_type, RecordType::A);
        assert!(record.weight.is_none());
        assert!(record.proxied);
    }

    #[test]
    fn spec_to_wire_includes_priority_only_when_present() {
        let features = Features {
            supports_proxied: true,
            ttl_floor: 60,
            requires_trailing_dot: false,
            supports_batch: false,
        };
        let spec = normalize(
            &features,
            "example.com",
            RecordType::Mx,
            "example.com",
            "mail.example.com",
            300,
            false,
            Some(10),
            None,
            None,
            None,
            None,
        );
        let wire = spec_to_wire(&spec);
        assert_eq!(wire["priority"], 10);
    }

    #[test]
    fn spec_to_wire_omits_priority_for_a_record() {
        let features = Features {
            supports_proxied: true,
            ttl_floor: 60,
            requires_trailing_dot: false,
            supports_batch: false,
        };
        let spec = normalize(
            &features, "example.com", RecordType::A, "app.example.com", "1.2.3.4", 300, true, None, None, None, None, None,
        );
        let wire = spec_to_wire(&spec);
        assert!(wire.get("priority").is_none());
    }
}
