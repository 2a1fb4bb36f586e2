//! Error types for the command relay.

use thiserror::Error;

pub type RelayResult<T> = Result<T, RelayError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("decode error: {0}")]
    Decode(String),

    #[error("execution error: {0}")]
    Execution(String),

    /// Snapshot write or recovery read failed.
    #[error("persistence error: {0}")]
    Persistence(String),
}
