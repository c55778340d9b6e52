//! # Analysis Orchestration
//!
//! Drives complete analysis runs: fetch resources, build and discover the
//! graph, evaluate every pattern definition and persist the matches.
//!
//! ## Architecture
//!
//! ```text
//! RunQueue::submit(RunRequest) ──> RunAck (immediately)
//!     │
//!     └──> worker (one run at a time, RunLock per target)
//!            │
//!            └──> AnalysisRunner::run
//!                   ├─ ResourceSource::list_resources per kind
//!                   │    └─ NotFound/Forbidden => empty, else abort
//!                   ├─ RelationshipDiscovery::discover
//!                   ├─ DefinitionSource::{fetch, list_all}
//!                   ├─ MatchSink::replace_all
//!                   └─ lint -> parse -> analyze -> dedup -> MatchSink::save
//! ```
//!
//! Adapters: [`SnapshotSource`] (captured `kubectl` JSON),
//! [`DirectoryDefinitionSource`], [`GitHubRegistrySource`],
//! [`FileMatchSink`] and [`MemorySink`].

mod config;
mod error;
mod queue;
mod registry;
mod runner;
mod sink;
mod snapshot;
mod source;

pub use config::{
    AnalysisConfig, KindSpec, RegistryConfig, ReportConfig, CONFIG_ENV, OUTPUT_DIR_ENV,
    REGISTRY_TOKEN_ENV,
};
pub use error::{AnalysisError, Result};
pub use queue::{RunAck, RunGuard, RunLock, RunOutcome, RunQueue};
pub use registry::{DirectoryDefinitionSource, GitHubRegistrySource};
pub use runner::{
    build_snapshot, AnalysisRunner, ClusterSnapshot, RunReport, RunRequest, RunTarget,
    SkippedDefinition,
};
pub use sink::{record_in_scope, FileMatchSink, MemorySink};
pub use snapshot::SnapshotSource;
pub use source::{DefinitionSource, MatchSink, ResourceSource, SourceError};
