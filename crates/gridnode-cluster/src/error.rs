//! Error types for the node registry.

use thiserror::Error;

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("failed to connect to peer {peer} at {uri}: {reason}")]
    Connection {
        peer: String,
        uri: String,
        reason: String,
    },
}
