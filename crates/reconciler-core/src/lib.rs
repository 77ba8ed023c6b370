//! Core of the DNS reconciliation engine: the data model, the provider
//! and source-extractor traits, the tracker contract, config resolution,
//! and the `Engine` that wires C2 through C8 together.
//!
//! Provider adapters (`reconciler-provider-*`), source extractors
//! (`reconciler-source-*`), and the tracker backend
//! (`reconciler-tracker-sqlite`) live in their own crates and depend on
//! this one; this crate performs no provider/API/filesystem I/O beyond
//! what the in-memory tracker and cache need.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod extractor;
pub mod hostname;
pub mod label;
pub mod provider;
pub mod reconciler;
pub mod record;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod spec;
pub mod sweeper;
pub mod tracked;
pub mod tracker;

pub use cache::{CacheWrite, RecordCache, RecordFilter};
pub use config::OperatorConfig;
pub use engine::Engine;
pub use error::{Error, ErrorKind, Result};
pub use events::EngineEvent;
pub use extractor::{ManualSourceExtractor, SourceExtractor};
pub use provider::{Features, NormalizedRecordSpec, ProviderAdapter, ProviderFactory};
pub use reconciler::{PassReport, Reconciler};
pub use record::{Record, RecordKey, RecordType};
pub use registry::Registry;
pub use spec::{DesiredSpec, SourceKind};
pub use sweeper::{OrphanSweeper, SweepReport};
pub use tracked::{PreservationList, TrackedEntry};
pub use tracker::{InMemoryTracker, Tracker};
