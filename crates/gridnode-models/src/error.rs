//! Error types for model management and collaborator engines.

use thiserror::Error;

/// Result type alias for model manager operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Outcome kinds reported by the model manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("model with id {0} already exists")]
    AlreadyExists(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("execution error: {0}")]
    Execution(String),
}

/// Failure reported by an inference or command execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("malformed input: {0}")]
    InvalidInput(String),

    #[error("missing object: {0}")]
    MissingObject(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<EngineError> for ModelError {
    fn from(e: EngineError) -> Self {
        ModelError::Execution(e.to_string())
    }
}
