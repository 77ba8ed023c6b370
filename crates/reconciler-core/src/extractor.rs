//! Source Extractor contract: produces `DesiredSpec`s from some
//! external source (running containers, a router's dynamic config, a
//! manual list). `reconciler-source-docker` and `reconciler-source-router`
//! implement this; the reconciler only depends on the trait.

use crate::error::Result;
use crate::hostname::normalize_hostname;
use crate::record::RecordType;
use crate::spec::{DesiredSpec, SourceKind};
use async_trait::async_trait;

#[async_trait]
pub trait SourceExtractor: Send + Sync {
    fn source_kind(&self) -> SourceKind;

    /// One-shot extraction of all desired specs currently visible from
    /// this source. Called at the start of every reconciliation pass.
    async fn extract(&self) -> Result<Vec<DesiredSpec>>;
}

/// The third extractor `SPEC_FULL.md` §4.8 calls for: `managedHostnames`
/// is a fixed list of hostnames configured directly by the operator
/// rather than discovered from containers or routers. Each entry becomes
/// one managed `DesiredSpec` of the configured default type, with no
/// explicit content — A/AAAA records fall back to the resolved public IP
/// exactly as an extractor-discovered spec would. The list is fixed at
/// construction time, so `extract` never varies across calls.
pub struct ManualSourceExtractor {
    specs: Vec<DesiredSpec>,
}

impl ManualSourceExtractor {
    /// `hostnames` come straight from `RECONCILER_MANAGED_HOSTNAMES`;
    /// each is normalized and rejected the same way any other source's
    /// hostname would be.
    pub fn new(hostnames: &[String], default_type: RecordType) -> Result<Self> {
        let specs = hostnames
            .iter()
            .map(|raw| {
                let hostname = normalize_hostname(raw)?;
                Ok(DesiredSpec::new(hostname, default_type, SourceKind::Manual))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { specs })
    }
}

#[async_trait]
impl SourceExtractor for ManualSourceExtractor {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Manual
    }

    async fn extract(&self) -> Result<Vec<DesiredSpec>> {
        Ok(self.specs.clone())
    }
}
