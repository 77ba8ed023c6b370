//! Container-label source extractor reading the local Docker Engine
//! API via `bollard`.
//!
//! Trust level: untrusted input. A container's labels are operator- or
//! image-author-controlled; this crate only turns them into
//! `DesiredSpec`s through `reconciler_core::label::parse_container_labels`
//! (which rejects anything outside the closed label-key set) and never
//! executes anything the labels name.

use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::system::EventsOptions;
use bollard::Docker;
use futures::StreamExt;
use reconciler_core::error::{Error, Result};
use reconciler_core::label::parse_container_labels;
use reconciler_core::registry::SourceExtractorFactory;
use reconciler_core::spec::{DesiredSpec, SourceKind};
use reconciler_core::SourceExtractor;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Docker events this crate treats as "something changed, run a pass."
/// Container lifecycle matters; exec/health-check noise does not.
const RELEVANT_ACTIONS: &[&str] = &["start", "stop", "die", "destroy", "pause", "unpause"];

pub struct DockerSourceExtractor {
    docker: Docker,
    label_prefixes: Vec<String>,
    default_type: reconciler_core::RecordType,
}

impl DockerSourceExtractor {
    /// Connects using the platform default (unix socket on Linux/macOS,
    /// named pipe on Windows) exactly as `bollard::Docker::connect_with_local_defaults`
    /// resolves it; this crate does not add its own transport.
    ///
    /// `default_type` is the operator's `dnsDefaultType` (SPEC_FULL §4.8):
    /// the record type a container gets when it has no `dns.type` label.
    pub fn connect(label_prefixes: Vec<String>, default_type: reconciler_core::RecordType) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::config(format!("failed to connect to docker daemon: {e}")))?;
        Ok(Self { docker, label_prefixes, default_type })
    }

    fn prefix_refs(&self) -> Vec<&str> {
        self.label_prefixes.iter().map(String::as_str).collect()
    }
}

#[async_trait]
impl SourceExtractor for DockerSourceExtractor {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Container
    }

    async fn extract(&self) -> Result<Vec<DesiredSpec>> {
        let options = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| Error::provider("docker", reconciler_core::ErrorKind::Transient, format!("list_containers failed: {e}")))?;

        let prefixes = self.prefix_refs();
        let mut specs = Vec::new();
        for container in containers {
            let Some(labels) = container.labels else {
                continue;
            };
            if labels.is_empty() {
                continue;
            }
            let name = container
                .names
                .as_ref()
                .and_then(|n| n.first())
                .cloned()
                .unwrap_or_else(|| container.id.clone().unwrap_or_default());

            match parse_container_labels(&prefixes, &labels, self.default_type) {
                Ok(container_specs) => specs.extend(container_specs),
                Err(e) => {
                    // A malformed label on one container must not prevent
                    // extraction from every other container (SPEC_FULL
                    // §4.4): surface as a logged validation error, skip
                    // just this container's specs.
                    warn!(container = %name, error = %e, "skipping container: invalid dns labels");
                }
            }
        }
        Ok(specs)
    }
}

/// Spawns the Docker event subscription (SPEC_FULL §4.7): forwards a
/// debounced trigger every time a container lifecycle event of interest
/// occurs, reconnecting with exponential backoff (max 30s) on stream
/// disconnect.
pub fn spawn_event_watcher(docker: Docker, trigger: mpsc::UnboundedSender<()>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = Duration::from_secs(1);
        loop {
            let options = EventsOptions::<String> {
                filters: HashMap::from([("type".to_string(), vec!["container".to_string()])]),
                ..Default::default()
            };
            let mut stream = docker.events(Some(options));
            let mut saw_any = false;
            while let Some(event) = stream.next().await {
                match event {
                    Ok(message) => {
                        saw_any = true;
                        backoff = Duration::from_secs(1);
                        let action = message.action.as_deref().unwrap_or_default();
                        if RELEVANT_ACTIONS.contains(&action) {
                            debug!(action, "docker event triggered reconciliation");
                            if trigger.send(()).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "docker event stream error");
                        break;
                    }
                }
            }
            if trigger.is_closed() {
                return;
            }
            warn!(backoff_secs = backoff.as_secs(), saw_any, "docker event stream disconnected, reconnecting");
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(Duration::from_secs(30));
        }
    })
}

#[derive(Deserialize)]
struct DockerSourceConfig {
    #[serde(default = "default_label_prefixes")]
    label_prefixes: Vec<String>,
    #[serde(default)]
    default_type: reconciler_core::RecordType,
}

fn default_label_prefixes() -> Vec<String> {
    vec!["dns.".to_string(), "traefik.".to_string()]
}

pub struct DockerSourceFactory;

#[async_trait]
impl SourceExtractorFactory for DockerSourceFactory {
    async fn create(&self, config: serde_json::Value) -> Result<Box<dyn SourceExtractor>> {
        let parsed: DockerSourceConfig = if config.is_null() {
            DockerSourceConfig {
                label_prefixes: default_label_prefixes(),
                default_type: reconciler_core::RecordType::default(),
            }
        } else {
            serde_json::from_value(config)
                .map_err(|e| Error::config(format!("invalid docker source config: {e}")))?
        };
        Ok(Box::new(DockerSourceExtractor::connect(parsed.label_prefixes, parsed.default_type)?))
    }
}

pub fn register(registry: &reconciler_core::Registry) {
    registry.register_extractor("docker", std::sync::Arc::new(DockerSourceFactory));
}
