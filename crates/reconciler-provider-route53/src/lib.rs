//! AWS Route 53 DNS provider adapter
//!
//! Trust level: untrusted. Performs exactly the API calls `ProviderAdapter`
//! asks for and nothing else — no retry, no backoff, no caching, matching
//! this system's provider/engine trust split (see `reconciler-provider-cloudflare`).
//!
//! ## Route 53 quirks
//!
//! - Authenticated with SigV4 via `aws-config`'s default credential chain
//!   (environment, profile, IMDS, or an assumed role when `role_arn` is
//!   configured), not a bearer token.
//! - Records have no provider-assigned id; `(name, type)` is the natural
//!   key Route 53 itself uses, so this adapter synthesizes `id` as
//!   `"{name}|{type}"` and looks the record back up by that key on
//!   update/delete, since `ChangeResourceRecordSets` requires the
//!   record's exact current TTL and values to delete it.
//! - Every mutation goes through `ChangeResourceRecordSets` with a single
//!   `Change` in the batch: this system's `ProviderAdapter` contract is
//!   per-record, so `Features::supports_batch` describes what the wire
//!   protocol is capable of, not something this adapter's interface
//!   exposes today.
//! - TXT values longer than 255 octets are split into multiple quoted
//!   DNS character-strings within one `ResourceRecord` value, per
//!   `reconciler_core::record::split_txt_octets`.
//! - `requires_trailing_dot` is true: CNAME/MX/NS/SRV targets get a
//!   trailing dot before being sent (`provider::normalize`); names coming
//!   back from Route 53 always carry one and are stripped on the way in.

use async_trait::async_trait;
use aws_sdk_route53::types::{Change, ChangeAction, ChangeBatch, ResourceRecord, ResourceRecordSet, RrType};
use aws_sdk_route53::Client;
use reconciler_core::error::{redact, Error, ErrorKind};
use reconciler_core::provider::{Features, NormalizedRecordSpec, ProviderAdapter, ProviderFactory};
use reconciler_core::record::{split_txt_octets, strip_dot_lower, Record, RecordType};
use reconciler_core::Result;
use serde::Deserialize;
use serde_json::Value;

pub struct Route53Provider {
    client: Client,
    hosted_zone_id: String,
    domain: String,
}

impl std::fmt::Debug for Route53Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route53Provider")
            .field("hosted_zone_id", &self.hosted_zone_id)
            .field("domain", &self.domain)
            .finish()
    }
}

impl Route53Provider {
    /// Credentials resolve through `aws-config`'s default provider chain;
    /// `role_arn`, when set, is assumed before any zone call is made.
    /// `region` defaults to Route 53's single global endpoint region when
    /// unset, matching the service's own API (Route 53 is not regional).
    pub async fn connect(hosted_zone_id: impl Into<String>, region: Option<String>, role_arn: Option<String>) -> Result<Self> {
        let hosted_zone_id = hosted_zone_id.into();
        if hosted_zone_id.trim().is_empty() {
            return Err(Error::config("route53 hosted_zone_id must not be empty"));
        }

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        let base_config = loader.load().await;

        let client = if let Some(role_arn) = role_arn {
            let assumed = aws_config::sts::AssumeRoleProvider::builder()
                .role_arn(role_arn)
                .session_name("reconciler")
                .configure(&base_config)
                .build()
                .await;
            let mut assumed_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
                .credentials_provider(assumed);
            if let Some(region) = region {
                assumed_loader = assumed_loader.region(aws_config::Region::new(region));
            }
            Client::new(&assumed_loader.load().await)
        } else {
            Client::new(&base_config)
        };

        let domain = client
            .get_hosted_zone()
            .id(&hosted_zone_id)
            .send()
            .await
            .map_err(|e| Error::provider("route53", ErrorKind::Transient, redact(&e.to_string())))?
            .hosted_zone()
            .map(|z| strip_dot_lower(z.name()))
            .ok_or_else(|| Error::provider("route53", ErrorKind::NotFound, format!("hosted zone not found: {hosted_zone_id}")))?;

        Ok(Self { client, hosted_zone_id, domain })
    }

    fn record_id(name: &str, record_type: RecordType) -> String {
        format!("{}|{record_type}", strip_dot_lower(name))
    }

    async fn find_record_set(&self, name: &str, record_type: RecordType) -> Result<Option<ResourceRecordSet>> {
        let rr_type: RrType = record_type_to_rr(record_type);
        let response = self
            .client
            .list_resource_record_sets()
            .hosted_zone_id(&self.hosted_zone_id)
            .start_record_name(format!("{}.", name.trim_end_matches('.')))
            .start_record_type(rr_type.clone())
            .max_items(1)
            .send()
            .await
            .map_err(|e| Error::provider("route53", ErrorKind::Transient, redact(&e.to_string())))?;

        Ok(response
            .resource_record_sets()
            .iter()
            .find(|rs| strip_dot_lower(rs.name()) == strip_dot_lower(name) && rs.r#type() == &rr_type)
            .cloned())
    }

    async fn submit_change(&self, action: ChangeAction, resource_record_set: ResourceRecordSet) -> Result<()> {
        let change = Change::builder()
            .action(action)
            .resource_record_set(resource_record_set)
            .build()
            .map_err(|e| Error::internal(format!("invalid route53 change: {e}")))?;
        let batch = ChangeBatch::builder()
            .changes(change)
            .build()
            .map_err(|e| Error::internal(format!("invalid route53 change batch: {e}")))?;

        self.client
            .change_resource_record_sets()
            .hosted_zone_id(&self.hosted_zone_id)
            .change_batch(batch)
            .send()
            .await
            .map_err(|e| {
                let msg = redact(&e.to_string());
                let kind = if msg.contains("it already exists") {
                    ErrorKind::Conflict
                } else if msg.contains("Throttling") || msg.contains("429") {
                    ErrorKind::RateLimited
                } else if msg.contains("AccessDenied") || msg.contains("403") {
                    ErrorKind::Auth
                } else {
                    ErrorKind::Transient
                };
                Error::provider("route53", kind, msg)
            })?;
        Ok(())
    }

    fn spec_to_record_set(&self, spec: &NormalizedRecordSpec) -> Result<ResourceRecordSet> {
        let rr_type = record_type_to_rr(spec.record_type);
        let values = if spec.record_type == RecordType::Txt {
            split_txt_octets(&spec.content)
                .into_iter()
                .map(|chunk| format!("\"{chunk}\""))
                .collect::<Vec<_>>()
                .join(" ")
        } else if spec.record_type == RecordType::Mx {
            format!("{} {}", spec.priority.unwrap_or(0), spec.content)
        } else if spec.record_type == RecordType::Srv {
            format!(
                "{} {} {} {}",
                spec.priority.unwrap_or(0),
                spec.weight.unwrap_or(0),
                spec.port.unwrap_or(0),
                spec.content
            )
        } else {
            spec.content.clone()
        };

        let resource_record = ResourceRecord::builder()
            .value(values)
            .build()
            .map_err(|e| Error::internal(format!("invalid route53 resource record: {e}")))?;

        ResourceRecordSet::builder()
            .name(format!("{}.", spec.name.trim_end_matches('.')))
            .r#type(rr_type)
            .ttl(spec.ttl as i64)
            .resource_records(resource_record)
            .build()
            .map_err(|e| Error::internal(format!("invalid route53 record set: {e}")))
    }

    fn record_set_to_record(&self, rs: &ResourceRecordSet) -> Record {
        let record_type = rr_to_record_type(rs.r#type());
        let name = strip_dot_lower(rs.name());
        let raw_values: Vec<String> = rs
            .resource_records()
            .iter()
            .map(|r| r.value().to_string())
            .collect();

        let (content, priority, weight, port) = decompose_wire_values(record_type, &raw_values);

        Record {
            id: Self::record_id(&name, record_type),
            zone: String::new(),
            record_type,
            name,
            content,
            ttl: rs.ttl().unwrap_or(300).max(0) as u32,
            proxied: false,
            priority,
            weight,
            port,
            flags: None,
            tag: None,
        }
    }
}

#[async_trait]
impl ProviderAdapter for Route53Provider {
    fn provider_name(&self) -> &'static str {
        "route53"
    }

    fn capabilities(&self) -> Features {
        Features {
            supports_proxied: false,
            ttl_floor: 1,
            requires_trailing_dot: true,
            supports_batch: true,
        }
    }

    fn zone(&self) -> &str {
        &self.domain
    }

    async fn list_zone_records(&self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        let mut start_name: Option<String> = None;
        let mut start_type: Option<RrType> = None;
        loop {
            let mut request = self.client.list_resource_record_sets().hosted_zone_id(&self.hosted_zone_id);
            if let Some(name) = &start_name {
                request = request.start_record_name(name.clone());
            }
            if let Some(rr_type) = start_type.clone() {
                request = request.start_record_type(rr_type);
            }
            let response = request
                .send()
                .await
                .map_err(|e| Error::provider("route53", ErrorKind::Transient, redact(&e.to_string())))?;

            for rs in response.resource_record_sets() {
                records.push(self.record_set_to_record(rs));
            }

            if response.is_truncated() {
                start_name = response.next_record_name().map(str::to_string);
                start_type = response.next_record_type().cloned();
            } else {
                break;
            }
        }
        Ok(records)
    }

    async fn create_record(&self, spec: &NormalizedRecordSpec) -> Result<Record> {
        let record_set = self.spec_to_record_set(spec)?;
        match self.submit_change(ChangeAction::Create, record_set.clone()).await {
            Ok(()) => Ok(self.record_set_to_record(&record_set)),
            Err(e) if e.kind() == Some(ErrorKind::Conflict) => {
                use reconciler_core::record::content_discriminator;
                let wanted = content_discriminator(spec.record_type, &spec.content, spec.priority, spec.weight, spec.port, spec.flags, spec.tag.as_deref());
                match self.find_record_set(&spec.name, spec.record_type).await? {
                    Some(existing) => {
                        let r = self.record_set_to_record(&existing);
                        let got = content_discriminator(r.record_type, &r.content, r.priority, r.weight, r.port, r.flags, r.tag.as_deref());
                        if got == wanted {
                            Ok(r)
                        } else {
                            Err(e)
                        }
                    }
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn update_record(&self, _id: &str, spec: &NormalizedRecordSpec) -> Result<Record> {
        let record_set = self.spec_to_record_set(spec)?;
        self.submit_change(ChangeAction::Upsert, record_set.clone()).await?;
        Ok(self.record_set_to_record(&record_set))
    }

    async fn delete_record(&self, id: &str) -> Result<()> {
        let Some((name, type_str)) = id.split_once('|') else {
            return Err(Error::internal(format!("malformed route53 record id: {id}")));
        };
        let record_type: RecordType = type_str
            .parse()
            .map_err(|_| Error::internal(format!("malformed route53 record id: {id}")))?;

        match self.find_record_set(name, record_type).await? {
            Some(record_set) => self.submit_change(ChangeAction::Delete, record_set).await,
            // Already gone: deleting an absent record is idempotent success.
            None => Ok(()),
        }
    }
}

fn record_type_to_rr(record_type: RecordType) -> RrType {
    RrType::from(record_type.to_string().as_str())
}

fn rr_to_record_type(rr_type: &RrType) -> RecordType {
    rr_type.as_str().parse().unwrap_or(RecordType::A)
}

/// Reassemble a wire-format resource record value list into this system's
/// content/priority/weight/port fields, inverting `spec_to_record_set`.
fn decompose_wire_values(record_type: RecordType, values: &[String]) -> (String, Option<u16>, Option<u16>, Option<u16>) {
    let joined = values.first().cloned().unwrap_or_default();
    match record_type {
        RecordType::Txt => (parse_txt_wire(values), None, None, None),
        RecordType::Mx => {
            let mut parts = joined.splitn(2, ' ');
            let priority = parts.next().and_then(|p| p.parse().ok());
            let exchange = parts.next().unwrap_or_default().to_string();
            (exchange, priority, None, None)
        }
        RecordType::Srv => {
            let mut parts = joined.splitn(4, ' ');
            let priority = parts.next().and_then(|p| p.parse().ok());
            let weight = parts.next().and_then(|p| p.parse().ok());
            let port = parts.next().and_then(|p| p.parse().ok());
            let target = parts.next().unwrap_or_default().to_string();
            (target, priority, weight, port)
        }
        _ => (joined, None, None, None),
    }
}

/// Parse one or more `"chunk"` quoted DNS character-strings out of a
/// Route 53 TXT resource record value and concatenate them back into the
/// logical value.
fn parse_txt_wire(values: &[String]) -> String {
    let joined = values.first().cloned().unwrap_or_default();
    let mut out = String::new();
    let mut chars = joined.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            for next in chars.by_ref() {
                if next == '"' {
                    break;
                }
                out.push(next);
            }
        }
    }
    if out.is_empty() {
        joined
    } else {
        out
    }
}

/// Factory constructing a `Route53Provider` from the JSON form of
/// `reconciler_core::config::DnsProviderConfig::Route53`.
pub struct Route53Factory;

#[derive(Deserialize)]
struct Route53FactoryConfig {
    hosted_zone_id: String,
    region: Option<String>,
    role_arn: Option<String>,
}

#[async_trait]
impl ProviderFactory for Route53Factory {
    async fn create(&self, config: Value) -> Result<Box<dyn ProviderAdapter>> {
        let parsed: Route53FactoryConfig = serde_json::from_value(config)
            .map_err(|e| Error::config(format!("invalid route53 provider config: {e}")))?;
        let provider = Route53Provider::connect(parsed.hosted_zone_id, parsed.region, parsed.role_arn).await?;
        Ok(Box::new(provider))
    }

    fn type_name(&self) -> &'static str {
        "route53"
    }
}

pub fn register(registry: &reconciler_core::Registry) {
    registry.register_provider("route53", std::sync::Arc::new(Route53Factory));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txt_wire_roundtrips_through_split_and_parse() {
        let long = "a".repeat(600);
        let chunks = split_txt_octets(&long);
        let wire = chunks.iter().map(|c| format!("\"{c}\"")).collect::<Vec<_>>().join(" ");
        let parsed = parse_txt_wire(&[wire]);
        assert_eq!(parsed, long);
    }

    #[test]
    fn short_txt_wire_roundtrips() {
        let wire = "\"v=spf1 -all\"".to_string();
        assert_eq!(parse_txt_wire(&[wire]), "v=spf1 -all");
    }

    #[test]
    fn decompose_mx_splits_priority_and_exchange() {
        let (content, priority, _, _) = decompose_wire_values(RecordType::Mx, &["10 mail.example.com".to_string()]);
        assert_eq!(priority, Some(10));
        assert_eq!(content, "mail.example.com");
    }

    #[test]
    fn decompose_srv_splits_all_fields() {
        let (target, priority, weight, port) =
            decompose_wire_values(RecordType::Srv, &["10 20 5060 sip.example.com".to_string()]);
        assert_eq!((priority, weight, port), (Some(10), Some(20), Some(5060)));
        assert_eq!(target, "sip.example.com");
    }

    #[test]
    fn record_id_combines_name_and_type() {
        assert_eq!(Route53Provider::record_id("app.example.com.", RecordType::A), "app.example.com|A");
    }
}
