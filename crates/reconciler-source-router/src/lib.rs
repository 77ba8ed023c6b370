//! Router-config source extractor: reads a reverse-proxy dynamic
//! configuration tree and extracts the concrete hostnames its rules name.
//!
//! This is not a rule-language evaluator. It is a "what host literals does
//! this rule mention" extractor, exactly as much as DNS reconciliation
//! needs and no more.

mod rule;

use async_trait::async_trait;
use reconciler_core::config::RouterSourceConfig;
use reconciler_core::error::{Error, Result};
use reconciler_core::label::parse_container_labels;
use reconciler_core::registry::SourceExtractorFactory;
use reconciler_core::spec::{DesiredSpec, SourceKind};
use reconciler_core::SourceExtractor;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::debug;

pub use rule::extract_hosts;

pub struct RouterSourceExtractor {
    config_path: PathBuf,
    label_prefixes: Vec<String>,
    default_type: reconciler_core::RecordType,
}

impl RouterSourceExtractor {
    pub fn new(config_path: impl Into<PathBuf>, label_prefixes: Vec<String>) -> Self {
        Self::with_default_type(config_path, label_prefixes, reconciler_core::RecordType::default())
    }

    pub fn with_default_type(
        config_path: impl Into<PathBuf>,
        label_prefixes: Vec<String>,
        default_type: reconciler_core::RecordType,
    ) -> Self {
        Self {
            config_path: config_path.into(),
            label_prefixes,
            default_type,
        }
    }

    async fn load_config(&self) -> Result<RouterSourceConfig> {
        let raw = tokio::fs::read_to_string(&self.config_path)
            .await
            .map_err(|e| Error::config(format!("failed to read router config {}: {e}", self.config_path.display())))?;

        let is_json = self
            .config_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            serde_json::from_str(&raw).map_err(|e| Error::config(format!("invalid router config json: {e}")))
        } else {
            serde_yaml::from_str(&raw).map_err(|e| Error::config(format!("invalid router config yaml: {e}")))
        }
    }
}

#[async_trait]
impl SourceExtractor for RouterSourceExtractor {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Router
    }

    async fn extract(&self) -> Result<Vec<DesiredSpec>> {
        let config = self.load_config().await?;
        let prefixes: Vec<&str> = self.label_prefixes.iter().map(String::as_str).collect();
        let mut specs = Vec::new();

        for (router_name, entry) in &config.routers {
            let hosts = extract_hosts(&entry.rule);
            if hosts.is_empty() {
                debug!(router = %router_name, rule = %entry.rule, "rule names no literal host set, skipping");
                continue;
            }

            // Per-router labels follow the same closed key space as
            // container labels, minus the hostname/type fields the rule
            // already supplies: a router's labels describe attributes of
            // the hosts its rule names, not a second hostname to add.
            let overrides = parse_router_labels(&prefixes, &entry.labels, self.default_type)?;

            for host in hosts {
                let mut spec = DesiredSpec::new(host, overrides.record_type, SourceKind::Router);
                spec.content = overrides.content.clone();
                spec.ttl = overrides.ttl;
                spec.proxied = overrides.proxied;
                spec.priority = overrides.priority;
                spec.weight = overrides.weight;
                spec.port = overrides.port;
                spec.flags = overrides.flags;
                spec.tag = overrides.tag.clone();
                spec.managed = overrides.managed;
                specs.push(spec);
            }
        }

        Ok(specs)
    }
}

/// Overrides parsed from a router entry's `labels` map, reusing the
/// closed label-key grammar `parse_container_labels` already enforces —
/// a router entry only ever needs the bare (index-0) group since a rule
/// can name several hosts that all share the same record attributes.
struct RouterLabelOverrides {
    record_type: reconciler_core::RecordType,
    content: Option<String>,
    ttl: Option<u32>,
    proxied: Option<bool>,
    priority: Option<u16>,
    weight: Option<u16>,
    port: Option<u16>,
    flags: Option<u8>,
    tag: Option<String>,
    managed: bool,
}

fn parse_router_labels(
    prefixes: &[&str],
    labels: &std::collections::HashMap<String, String>,
    default_type: reconciler_core::RecordType,
) -> Result<RouterLabelOverrides> {
    // `parse_container_labels` requires a hostname label to produce a
    // spec at all; router entries carry their hostname in `rule`, not in
    // `labels`, so synthesize a placeholder hostname under whichever
    // prefix is configured, parse it for the attribute overrides, then
    // discard the placeholder hostname itself.
    let prefix = prefixes.first().copied().unwrap_or("dns.");
    let mut synthetic = labels.clone();
    synthetic
        .entry(format!("{prefix}hostname"))
        .or_insert_with(|| "placeholder.invalid".to_string());

    let specs = parse_container_labels(&[prefix], &synthetic, default_type)?;
    let placeholder = specs
        .into_iter()
        .next()
        .ok_or_else(|| Error::config("router entry labels produced no attribute set"))?;

    Ok(RouterLabelOverrides {
        record_type: placeholder.record_type,
        content: placeholder.content,
        ttl: placeholder.ttl,
        proxied: placeholder.proxied,
        priority: placeholder.priority,
        weight: placeholder.weight,
        port: placeholder.port,
        flags: placeholder.flags,
        tag: placeholder.tag,
        managed: placeholder.managed,
    })
}

#[derive(Deserialize)]
struct RouterSourceFactoryConfig {
    config_path: String,
    #[serde(default = "default_label_prefixes")]
    label_prefixes: Vec<String>,
    #[serde(default)]
    default_type: reconciler_core::RecordType,
}

fn default_label_prefixes() -> Vec<String> {
    vec!["dns.".to_string(), "traefik.".to_string()]
}

pub struct RouterSourceFactory;

#[async_trait]
impl SourceExtractorFactory for RouterSourceFactory {
    async fn create(&self, config: serde_json::Value) -> Result<Box<dyn SourceExtractor>> {
        let parsed: RouterSourceFactoryConfig = serde_json::from_value(config)
            .map_err(|e| Error::config(format!("invalid router source config: {e}")))?;
        Ok(Box::new(RouterSourceExtractor::with_default_type(
            parsed.config_path,
            parsed.label_prefixes,
            parsed.default_type,
        )))
    }
}

pub fn register(registry: &reconciler_core::Registry) {
    registry.register_extractor("router", std::sync::Arc::new(RouterSourceFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rule_without_host_predicate_yields_no_specs() {
        let dir = tempfile_dir();
        let path = dir.join("routers.yaml");
        tokio::fs::write(&path, "routers:\n  catchall:\n    rule: \"PathPrefix(`/`)\"\n    service: svc\n    labels: {}\n")
            .await
            .unwrap();
        let extractor = RouterSourceExtractor::new(&path, vec!["dns.".into()]);
        let specs = extractor.extract().await.unwrap();
        assert!(specs.is_empty());
    }

    #[tokio::test]
    async fn simple_host_rule_produces_a_spec() {
        let dir = tempfile_dir();
        let path = dir.join("routers.yaml");
        tokio::fs::write(
            &path,
            "routers:\n  app:\n    rule: \"Host(`app.example.com`)\"\n    service: app\n    labels:\n      dns.ttl: \"120\"\n",
        )
        .await
        .unwrap();
        let extractor = RouterSourceExtractor::new(&path, vec!["dns.".into()]);
        let specs = extractor.extract().await.unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].hostname, "app.example.com");
        assert_eq!(specs[0].ttl, Some(120));
        assert_eq!(specs[0].source, SourceKind::Router);
    }

    #[tokio::test]
    async fn operator_default_type_applies_when_no_type_label_is_set() {
        let dir = tempfile_dir();
        let path = dir.join("routers.yaml");
        tokio::fs::write(
            &path,
            "routers:\n  mail:\n    rule: \"Host(`mail.example.com`)\"\n    service: mail\n    labels: {}\n",
        )
        .await
        .unwrap();
        let extractor = RouterSourceExtractor::with_default_type(
            &path,
            vec!["dns.".into()],
            reconciler_core::RecordType::Cname,
        );
        let specs = extractor.extract().await.unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].record_type, reconciler_core::RecordType::Cname);
    }

    fn tempfile_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("reconciler-source-router-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
