use crate::source::SourceError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Graph error: {0}")]
    Graph(#[from] kubepattern_graph::GraphError),

    #[error(transparent)]
    Engine(#[from] kubepattern_engine::EngineError),

    /// Listing a kind failed in a way that must not be degraded
    #[error("Fetching {kind} failed: {source}")]
    Fetch { kind: String, source: SourceError },

    #[error("Pattern definitions unavailable: {0}")]
    Definitions(SourceError),

    #[error("Namespace not found: {0}")]
    NamespaceNotFound(String),

    /// A save failed after earlier records of the run were already stored
    #[error("Run stopped after saving {saved} record(s), stored results are partial: {source}")]
    PartialResults {
        saved: usize,
        source: Box<AnalysisError>,
    },

    #[error("An analysis of {0} is already running")]
    RunInProgress(String),

    #[error("{0}")]
    Other(String),
}
