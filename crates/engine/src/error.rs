use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by the pattern engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Definition failed lint or could not be parsed
    #[error("Error Parsing Pattern: {0}")]
    MalformedPattern(String),

    /// Graph query failed
    #[error("Graph error: {0}")]
    Graph(#[from] kubepattern_graph::GraphError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedPattern(msg.into())
    }
}
