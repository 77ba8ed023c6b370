//! DigitalOcean DNS provider adapter
//!
//! Trust level: untrusted. Performs exactly the HTTP calls `ProviderAdapter`
//! asks for and nothing else — no retry, no backoff, no caching, matching
//! this system's provider/engine trust split (see `reconciler-provider-cloudflare`).
//!
//! ## DigitalOcean quirks
//!
//! - Records are addressed by *domain* (the zone apex), not a provider-assigned
//!   zone id.
//! - The wire `name` field is relative to the domain (`"@"` for the apex,
//!   `"app"` for `app.example.com` on domain `example.com`), unlike every
//!   other provider this system supports, which use the fully qualified
//!   name. This adapter is the only place that relative/absolute
//!   conversion happens.
//! - No `proxied` concept; `Features::supports_proxied` is `false`.
//! - No batch endpoint; one HTTP call per record.
//!
//! ## Security
//!
//! The API token is never logged: the `Debug` impl redacts it, and every
//! error message is passed through `reconciler_core::error::redact` before
//! being surfaced.

use async_trait::async_trait;
use reconciler_core::error::{redact, Error, ErrorKind};
use reconciler_core::provider::{Features, NormalizedRecordSpec, ProviderAdapter, ProviderFactory};
use reconciler_core::record::{Record, RecordType};
use reconciler_core::Result;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const DIGITALOCEAN_API_BASE: &str = "https://api.digitalocean.com/v2";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct DigitalOceanProvider {
    api_token: String,
    domain: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for DigitalOceanProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigitalOceanProvider")
            .field("api_token", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}

impl DigitalOceanProvider {
    pub async fn connect(api_token: impl Into<String>, domain: impl Into<String>) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.trim().is_empty() {
            return Err(Error::config("digitalocean api_token must not be empty"));
        }
        let domain = domain.into();
        if domain.trim().is_empty() {
            return Err(Error::config("digitalocean domain must not be empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("failed to build http client: {e}")))?;
        Ok(Self { api_token, domain, client })
    }

    fn records_url(&self) -> String {
        format!("{DIGITALOCEAN_API_BASE}/domains/{}/records", self.domain)
    }

    fn record_url(&self, id: &str) -> String {
        format!("{}/{}", self.records_url(), id)
    }

    /// `app.example.com` on domain `example.com` -> `app`; the apex itself
    /// (`example.com`) -> `@`, DigitalOcean's convention for the zone root.
    fn relative_name(&self, fqdn: &str) -> String {
        let fqdn = fqdn.trim_end_matches('.');
        let suffix = format!(".{}", self.domain);
        if fqdn.eq_ignore_ascii_case(&self.domain) {
            "@".to_string()
        } else if let Some(stripped) = fqdn.strip_suffix(&suffix) {
            stripped.to_string()
        } else {
            fqdn.to_string()
        }
    }

    fn absolute_name(&self, relative: &str) -> String {
        if relative == "@" || relative.is_empty() {
            self.domain.clone()
        } else {
            format!("{relative}.{}", self.domain)
        }
    }

    /// A create that got a 409/422 "already exists" may mean a prior
    /// partial-failure run already created it; treat a matching
    /// name/type/content record as the create's result instead of
    /// surfacing the conflict.
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
impl ProviderAdapter for DigitalOceanProvider {
    fn provider_name(&self) -> &'static str {
        "digitalocean"
    }

    fn capabilities(&self) -> Features {
        Features {
            supports_proxied: false,
            ttl_floor: 30,
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
            let url = format!("{}?page={page}&per_page=200", self.records_url());
            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.api_token)
                .send()
                .await
                .map_err(transient_error)?;
            let body: DoListResponse = parse_response(response).await?;
            let returned = body.domain_records.len();
            records.extend(body.domain_records.into_iter().map(|r| self.wire_to_record(r)));
            if returned < 200 {
                break;
            }
            page += 1;
        }
        Ok(records)
    }

    async fn create_record(&self, spec: &NormalizedRecordSpec) -> Result<Record> {
        let payload = self.spec_to_wire(spec);
        let response = self
            .client
            .post(self.records_url())
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(transient_error)?;
        match parse_response::<DoRecordResponse>(response).await {
            Ok(body) => Ok(self.wire_to_record(body.domain_record)),
            Err(e) if e.kind() == Some(ErrorKind::Conflict) => match self.find_matching(spec).await? {
                Some(existing) => Ok(existing),
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    async fn update_record(&self, id: &str, spec: &NormalizedRecordSpec) -> Result<Record> {
        let payload = self.spec_to_wire(spec);
        let response = self
            .client
            .put(self.record_url(id))
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(transient_error)?;
        let body: DoRecordResponse = parse_response(response).await?;
        Ok(self.wire_to_record(body.domain_record))
    }

    async fn delete_record(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.record_url(id))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(transient_error)?;
        if !response.status().is_success() && response.status().as_u16() != 404 {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::provider(
                "digitalocean",
                status_to_kind(status.as_u16()),
                format!("{status}: {}", redact(&text)),
            ));
        }
        Ok(())
    }
}

impl DigitalOceanProvider {
    fn wire_to_record(&self, wire: DoDnsRecord) -> Record {
        Record {
            id: wire.id.to_string(),
            zone: String::new(),
            record_type: wire.record_type.parse().unwrap_or(RecordType::A),
            name: self.absolute_name(&wire.name),
            content: wire.data.unwrap_or_default(),
            ttl: wire.ttl.unwrap_or(1800),
            proxied: false,
            priority: wire.priority,
            weight: wire.weight,
            port: wire.port,
            flags: wire.flags,
            tag: wire.tag,
        }
    }

    fn spec_to_wire(&self, spec: &NormalizedRecordSpec) -> Value {
        let mut payload = serde_json::json!({
            "type": spec.record_type.to_string(),
            "name": self.relative_name(&spec.name),
            "data": spec.content,
            "ttl": spec.ttl,
        });
        if let Some(priority) = spec.priority {
            payload["priority"] = Value::from(priority);
        }
        if let Some(weight) = spec.weight {
            payload["weight"] = Value::from(weight);
        }
        if let Some(port) = spec.port {
            payload["port"] = Value::from(port);
        }
        if let Some(flags) = spec.flags {
            payload["flags"] = Value::from(flags);
        }
        if let Some(tag) = &spec.tag {
            payload["tag"] = Value::from(tag.clone());
        }
        payload
    }
}

fn status_to_kind(status: u16) -> ErrorKind {
    match status {
        401 | 403 => ErrorKind::Auth,
        404 => ErrorKind::NotFound,
        409 | 422 => ErrorKind::Conflict,
        429 => ErrorKind::RateLimited,
        500..=599 => ErrorKind::Transient,
        _ => ErrorKind::Validation,
    }
}

fn transient_error(e: reqwest::Error) -> Error {
    Error::provider("digitalocean", ErrorKind::Transient, redact(&e.to_string()))
}

async fn parse_response<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(Error::provider(
            "digitalocean",
            status_to_kind(status.as_u16()),
            format!("{status}: {}", redact(&text)),
        ));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| Error::provider("digitalocean", ErrorKind::Validation, format!("invalid response body: {e}")))
}

#[derive(Deserialize)]
struct DoListResponse {
    domain_records: Vec<DoDnsRecord>,
}

#[derive(Deserialize)]
struct DoRecordResponse {
    domain_record: DoDnsRecord,
}

#[derive(Deserialize)]
struct DoDnsRecord {
    id: u64,
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    ttl: Option<u32>,
    #[serde(default)]
    priority: Option<u16>,
    #[serde(default)]
    weight: Option<u16>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    flags: Option<u8>,
    #[serde(default)]
    tag: Option<String>,
}

/// Factory constructing a `DigitalOceanProvider` from the JSON form of
/// `reconciler_core::config::DnsProviderConfig::DigitalOcean`.
pub struct DigitalOceanFactory;

#[derive(Deserialize)]
struct DigitalOceanFactoryConfig {
    api_token: String,
    domain: String,
}

#[async_trait]
impl ProviderFactory for DigitalOceanFactory {
    async fn create(&self, config: Value) -> Result<Box<dyn ProviderAdapter>> {
        let parsed: DigitalOceanFactoryConfig = serde_json::from_value(config)
            .map_err(|e| Error::config(format!("invalid digitalocean provider config: {e}")))?;
        let provider = DigitalOceanProvider::connect(parsed.api_token, parsed.domain).await?;
        Ok(Box::new(provider))
    }

    fn type_name(&self) -> &'static str {
        "digitalocean"
    }
}

pub fn register(registry: &reconciler_core::Registry) {
    registry.register_provider("digitalocean", std::sync::Arc::new(DigitalOceanFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconciler_core::provider::normalize;

    fn provider() -> DigitalOceanProvider {
        DigitalOceanProvider {
            api_token: "x".into(),
            domain: "example.com".into(),
            client: reqwest::Client::new(),
        }
    }

    #[test]
    fn relative_name_strips_domain_suffix() {
        let p = provider();
        assert_eq!(p.relative_name("app.example.com"), "app");
    }

    #[test]
    fn relative_name_uses_at_for_apex() {
        let p = provider();
        assert_eq!(p.relative_name("example.com"), "@");
        assert_eq!(p.relative_name("example.com."), "@");
    }

    #[test]
    fn absolute_name_reconstructs_fqdn() {
        let p = provider();
        assert_eq!(p.absolute_name("app"), "app.example.com");
        assert_eq!(p.absolute_name("@"), "example.com");
    }

    #[test]
    fn spec_to_wire_uses_relative_name_and_data_field() {
        let p = provider();
        let features = p.capabilities();
        let spec = normalize(
            &features,
            "example.com",
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
        let wire = p.spec_to_wire(&spec);
        assert_eq!(wire["name"], "app");
        assert_eq!(wire["data"], "1.2.3.4");
        assert!(wire.get("proxied").is_none());
    }

    #[test]
    fn normalize_strips_proxied_since_digitalocean_does_not_support_it() {
        let p = provider();
        let spec = normalize(
            &p.capabilities(), "example.com", RecordType::A, "app.example.com", "1.2.3.4", 300, true, None, None, None, None, None,
        );
        assert!(!spec.proxied);
    }

    #[test]
    fn ttl_floor_is_thirty_seconds() {
        let p = provider();
        let spec = normalize(
            &p.capabilities(), "example.com", RecordType::A, "app.example.com", "1.2.3.4", 5, false, None, None, None, None, None,
        );
        assert_eq!(spec.ttl, 30);
    }
}
