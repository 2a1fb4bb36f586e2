//! Hex transport encoding for command payloads and model uploads.

use thiserror::Error;

#[derive(Debug, Error)]
#[error("malformed hex payload: {0}")]
pub struct TransportError(String);

/// Decode transport text into raw bytes.
///
/// Surrounding whitespace and an optional `0x` prefix are ignored.
pub fn decode(text: &str) -> Result<Vec<u8>, TransportError> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(digits).map_err(|e| TransportError(e.to_string()))
}

/// Encode raw bytes as lowercase hex transport text.
pub fn encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}
