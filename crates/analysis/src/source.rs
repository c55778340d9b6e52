//! Collaborator contracts of an analysis run.

use crate::config::KindSpec;
use crate::error::Result;
use crate::runner::RunTarget;
use async_trait::async_trait;
use kubepattern_graph::Resource;
use kubepattern_protocol::PatternRecord;
use thiserror::Error;

/// Classified collaborator failure.
///
/// `NotFound` and `Forbidden` degrade a single kind to an empty listing;
/// everything else aborts the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl SourceError {
    pub fn is_degradable(&self) -> bool {
        matches!(self, SourceError::NotFound(_) | SourceError::Forbidden(_))
    }
}

#[async_trait]
pub trait ResourceSource: Send + Sync {
    /// List every resource of `kind`, restricted to `namespace` when given.
    async fn list_resources(
        &self,
        kind: &KindSpec,
        namespace: Option<&str>,
    ) -> std::result::Result<Vec<Resource>, SourceError>;
}

#[async_trait]
pub trait DefinitionSource: Send + Sync {
    /// Text of the definition called `name`
    async fn fetch(&self, name: &str) -> std::result::Result<String, SourceError>;

    async fn list_all(&self) -> std::result::Result<Vec<String>, SourceError>;
}

#[async_trait]
pub trait MatchSink: Send + Sync {
    /// Remove every record a previous run over `target` emitted, limited to
    /// records of `pattern` when given; returns how many were removed.
    async fn replace_all(&self, target: &RunTarget, pattern: Option<&str>) -> Result<usize>;

    async fn save(&self, record: &PatternRecord) -> Result<()>;
}
