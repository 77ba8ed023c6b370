//! Plugin-based provider/extractor registry.
//!
//! Registers both pluggable output (DNS providers) and pluggable input
//! (`SourceExtractor`s — container labels, router config), since this
//! system has two kinds of plugin rather than the single provider
//! registry a single-host DDNS client would need.
//!
//! ## Registration
//!
//! Each provider/extractor crate exposes a `register(registry: &Registry)`
//! function called once at startup by `reconcilerd`:
//!
//! ```rust,ignore
//! // in reconciler-provider-cloudflare
//! pub fn register(registry: &Registry) {
//!     registry.register_provider("cloudflare", Arc::new(CloudflareFactory));
//! }
//! ```

use crate::error::{Error, Result};
use crate::extractor::SourceExtractor;
use crate::provider::{ProviderAdapter, ProviderFactory};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[async_trait::async_trait]
pub trait SourceExtractorFactory: Send + Sync {
    async fn create(&self, config: serde_json::Value) -> Result<Box<dyn SourceExtractor>>;
}

#[derive(Default)]
pub struct Registry {
    providers: RwLock<HashMap<String, Arc<dyn ProviderFactory>>>,
    extractors: RwLock<HashMap<String, Arc<dyn SourceExtractorFactory>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_provider(&self, name: impl Into<String>, factory: Arc<dyn ProviderFactory>) {
        self.providers.write().unwrap().insert(name.into(), factory);
    }

    pub fn register_extractor(
        &self,
        name: impl Into<String>,
        factory: Arc<dyn SourceExtractorFactory>,
    ) {
        self.extractors.write().unwrap().insert(name.into(), factory);
    }

    pub async fn create_provider(
        &self,
        type_name: &str,
        config: serde_json::Value,
    ) -> Result<Box<dyn ProviderAdapter>> {
        let factory = {
            let providers = self.providers.read().unwrap();
            providers
                .get(type_name)
                .ok_or_else(|| Error::config(format!("unknown provider type: {type_name}")))?
                .clone()
        };
        factory.create(config).await
    }

    pub async fn create_extractor(
        &self,
        type_name: &str,
        config: serde_json::Value,
    ) -> Result<Box<dyn SourceExtractor>> {
        let factory = {
            let extractors = self.extractors.read().unwrap();
            extractors
                .get(type_name)
                .ok_or_else(|| Error::config(format!("unknown extractor type: {type_name}")))?
                .clone()
        };
        factory.create(config).await
    }

    pub fn list_providers(&self) -> Vec<String> {
        self.providers.read().unwrap().keys().cloned().collect()
    }

    pub fn list_extractors(&self) -> Vec<String> {
        self.extractors.read().unwrap().keys().cloned().collect()
    }

    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.read().unwrap().contains_key(name)
    }

    pub fn has_extractor(&self, name: &str) -> bool {
        self.extractors.read().unwrap().contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockFactory;

    #[async_trait::async_trait]
    impl ProviderFactory for MockFactory {
        async fn create(&self, _config: serde_json::Value) -> Result<Box<dyn ProviderAdapter>> {
            Err(Error::config("mock provider not implemented"))
        }
        fn type_name(&self) -> &'static str {
            "mock"
        }
    }

    #[test]
    fn registration_is_visible_immediately() {
        let registry = Registry::new();
        assert!(!registry.has_provider("mock"));
        registry.register_provider("mock", Arc::new(MockFactory));
        assert!(registry.has_provider("mock"));
        assert!(registry.list_providers().contains(&"mock".to_string()));
    }
}
