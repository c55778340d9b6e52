use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    #[error("Resource not found in graph: {0}")]
    ResourceNotFound(String),

    #[error("Strategy {strategy} failed: {reason}")]
    StrategyFailed { strategy: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl GraphError {
    pub fn strategy(strategy: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StrategyFailed {
            strategy: strategy.into(),
            reason: reason.into(),
        }
    }
}
