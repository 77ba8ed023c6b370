//! Config Resolver: environment-variable configuration loading and
//! the layered defaults <- operator config <- label override resolution
//! that decides a record's effective TTL/proxied/content before it
//! reaches a provider adapter.
//!
//! This module owns parsing and validation; `reconcilerd` only calls it.

use crate::error::{Error, Result};
use crate::provider::Features;
use crate::record::RecordType;
use crate::spec::DesiredSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

fn default_poll_interval_secs() -> u64 {
    60
}
fn default_cleanup_grace_period_mins() -> u64 {
    15
}
fn default_ttl() -> u32 {
    300
}
fn default_cache_refresh_interval_secs() -> u64 {
    3600
}
fn default_ip_refresh_interval_secs() -> u64 {
    3600
}
fn default_api_timeout_ms() -> u64 {
    10_000
}
fn default_label_prefixes() -> Vec<String> {
    vec!["dns.".to_string(), "traefik.".to_string()]
}

/// Which source extractors actually run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
    /// Only the router config tree is consulted.
    Router,
    /// Only container labels are consulted.
    Direct,
    /// Both extractors run and are merged.
    Both,
}

impl std::str::FromStr for OperationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "router" => Ok(Self::Router),
            "direct" => Ok(Self::Direct),
            "both" => Ok(Self::Both),
            other => Err(Error::config(format!("invalid operation mode: {other}"))),
        }
    }
}

/// Provider selection and its credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DnsProviderConfig {
    Cloudflare {
        api_token: String,
        zone_id: Option<String>,
        account_id: Option<String>,
    },
    DigitalOcean {
        api_token: String,
        domain: String,
    },
    Route53 {
        hosted_zone_id: String,
        region: Option<String>,
        role_arn: Option<String>,
    },
}

impl DnsProviderConfig {
    pub fn type_name(&self) -> &'static str {
        match self {
            DnsProviderConfig::Cloudflare { .. } => "cloudflare",
            DnsProviderConfig::DigitalOcean { .. } => "digitalocean",
            DnsProviderConfig::Route53 { .. } => "route53",
        }
    }
}

/// The fully resolved, validated operator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    pub provider: DnsProviderConfig,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub watch_docker_events: bool,
    #[serde(default = "default_true")]
    pub cleanup_orphaned: bool,
    #[serde(default = "default_cleanup_grace_period_mins")]
    pub cleanup_grace_period_mins: u64,

    #[serde(default = "default_ttl")]
    pub default_ttl: u32,
    #[serde(default)]
    pub default_proxied: bool,
    #[serde(default = "default_record_type")]
    pub default_type: RecordType,

    #[serde(default = "default_cache_refresh_interval_secs")]
    pub cache_refresh_interval_secs: u64,
    #[serde(default = "default_ip_refresh_interval_secs")]
    pub ip_refresh_interval_secs: u64,

    #[serde(default = "default_label_prefixes")]
    pub label_prefixes: Vec<String>,
    #[serde(default)]
    pub preserved_hostnames: Vec<String>,
    #[serde(default)]
    pub managed_hostnames: Vec<String>,

    #[serde(default = "default_api_timeout_ms")]
    pub api_timeout_ms: u64,
    #[serde(default = "default_operation_mode")]
    pub operation_mode: OperationMode,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_true() -> bool {
    true
}
fn default_record_type() -> RecordType {
    RecordType::A
}
fn default_operation_mode() -> OperationMode {
    OperationMode::Both
}
fn default_log_level() -> String {
    "info".to_string()
}

impl OperatorConfig {
    /// Load configuration from `RECONCILER_*` environment variables
    /// (teacher's `DDNS_*` convention, renamed to this system's domain).
    pub fn from_env() -> Result<Self> {
        let provider_type = env::var("RECONCILER_DNS_PROVIDER")
            .map_err(|_| Error::config("RECONCILER_DNS_PROVIDER is required"))?;
        let provider = match provider_type.to_ascii_lowercase().as_str() {
            "cloudflare" => DnsProviderConfig::Cloudflare {
                api_token: require_env("RECONCILER_CLOUDFLARE_API_TOKEN")?,
                zone_id: env::var("RECONCILER_CLOUDFLARE_ZONE_ID").ok(),
                account_id: env::var("RECONCILER_CLOUDFLARE_ACCOUNT_ID").ok(),
            },
            "digitalocean" => DnsProviderConfig::DigitalOcean {
                api_token: require_env("RECONCILER_DIGITALOCEAN_API_TOKEN")?,
                domain: require_env("RECONCILER_DIGITALOCEAN_DOMAIN")?,
            },
            "route53" => DnsProviderConfig::Route53 {
                hosted_zone_id: require_env("RECONCILER_ROUTE53_HOSTED_ZONE_ID")?,
                region: env::var("RECONCILER_ROUTE53_REGION").ok(),
                role_arn: env::var("RECONCILER_ROUTE53_ROLE_ARN").ok(),
            },
            other => {
                return Err(Error::config(format!("unknown RECONCILER_DNS_PROVIDER: {other}")))
            }
        };

        let config = OperatorConfig {
            provider,
            poll_interval_secs: env_or_default("RECONCILER_POLL_INTERVAL_SECS", default_poll_interval_secs())?,
            watch_docker_events: env_bool_or_default("RECONCILER_WATCH_DOCKER_EVENTS", false)?,
            cleanup_orphaned: env_bool_or_default("RECONCILER_CLEANUP_ORPHANED", true)?,
            cleanup_grace_period_mins: env_or_default(
                "RECONCILER_CLEANUP_GRACE_PERIOD_MINS",
                default_cleanup_grace_period_mins(),
            )?,
            default_ttl: env_or_default("RECONCILER_DEFAULT_TTL", default_ttl())?,
            default_proxied: env_bool_or_default("RECONCILER_DEFAULT_PROXIED", false)?,
            default_type: env::var("RECONCILER_DEFAULT_TYPE")
                .ok()
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(RecordType::A),
            cache_refresh_interval_secs: env_or_default(
                "RECONCILER_CACHE_REFRESH_INTERVAL_SECS",
                default_cache_refresh_interval_secs(),
            )?,
            ip_refresh_interval_secs: env_or_default(
                "RECONCILER_IP_REFRESH_INTERVAL_SECS",
                default_ip_refresh_interval_secs(),
            )?,
            label_prefixes: env::var("RECONCILER_LABEL_PREFIX")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(default_label_prefixes),
            preserved_hostnames: split_csv_env("RECONCILER_PRESERVED_HOSTNAMES"),
            managed_hostnames: split_csv_env("RECONCILER_MANAGED_HOSTNAMES"),
            api_timeout_ms: env_or_default("RECONCILER_API_TIMEOUT_MS", default_api_timeout_ms())?,
            operation_mode: env::var("RECONCILER_OPERATION_MODE")
                .ok()
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(OperationMode::Both),
            log_level: env::var("RECONCILER_LOG_LEVEL").unwrap_or_else(|_| default_log_level()),
        };

        if let Ok(path) = env::var("RECONCILER_ROUTER_CONFIG_FILE") {
            if !std::path::Path::new(&path).exists() {
                return Err(Error::config(format!(
                    "RECONCILER_ROUTER_CONFIG_FILE does not exist: {path}"
                )));
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(Error::config("poll_interval_secs must be > 0"));
        }
        if self.cache_refresh_interval_secs == 0 {
            return Err(Error::config("cache_refresh_interval_secs must be > 0"));
        }
        if self.ip_refresh_interval_secs == 0 {
            return Err(Error::config("ip_refresh_interval_secs must be > 0"));
        }
        if self.label_prefixes.is_empty() {
            return Err(Error::config("label_prefixes must not be empty"));
        }
        match &self.provider {
            DnsProviderConfig::Cloudflare { api_token, .. } if api_token.trim().is_empty() => {
                return Err(Error::config("cloudflare api_token must not be empty"))
            }
            DnsProviderConfig::DigitalOcean { api_token, domain } => {
                if api_token.trim().is_empty() {
                    return Err(Error::config("digitalocean api_token must not be empty"));
                }
                if domain.trim().is_empty() {
                    return Err(Error::config("digitalocean domain must not be empty"));
                }
            }
            DnsProviderConfig::Route53 { hosted_zone_id, .. } if hosted_zone_id.trim().is_empty() => {
                return Err(Error::config("route53 hosted_zone_id must not be empty"))
            }
            _ => {}
        }
        Ok(())
    }
}

fn require_env(key: &str) -> Result<String> {
    env::var(key).map_err(|_| Error::config(format!("{key} is required")))
}

fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|_| Error::config(format!("{key} is not a valid value: {v}"))),
        Err(_) => Ok(default),
    }
}

fn env_bool_or_default(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(v) => match v.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(Error::config(format!("{key} must be a boolean, got: {other}"))),
        },
        Err(_) => Ok(default),
    }
}

fn split_csv_env(key: &str) -> Vec<String> {
    env::var(key)
        .ok()
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// A record's fully resolved mutable attributes, after layering:
/// provider `Features` <- operator defaults <- per-spec (label) overrides.
#[derive(Debug, Clone)]
pub struct EffectiveRecordConfig {
    pub ttl: u32,
    pub proxied: bool,
}

/// Resolve the effective TTL/proxied for a desired spec, applying the
/// operator's defaults where the spec itself didn't specify a value, and
/// leaving provider-specific clamping (ttl floor, proxied support) to
/// `provider::normalize`.
pub fn resolve_effective(spec: &DesiredSpec, operator: &OperatorConfig) -> EffectiveRecordConfig {
    EffectiveRecordConfig {
        ttl: spec.ttl.unwrap_or(operator.default_ttl),
        proxied: spec.proxied.unwrap_or(operator.default_proxied),
    }
}

/// `Features` is consulted separately from `OperatorConfig`: this keeps
/// the config resolver ignorant of any one provider's capabilities,
/// matching the C1/C8 separation of concerns.
pub fn clamp_to_features(effective: &EffectiveRecordConfig, features: &Features) -> EffectiveRecordConfig {
    EffectiveRecordConfig {
        ttl: effective.ttl.max(features.ttl_floor),
        proxied: effective.proxied && features.supports_proxied,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterSourceConfig {
    pub routers: HashMap<String, RouterEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterEntry {
    pub rule: String,
    pub service: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}
