//! Object codec — moves models and tensors between blob and in-memory form.
//!
//! The node treats the codec as a collaborator: the model manager only needs
//! `decode_model` to classify a blob as plain or plan, and the API needs
//! tensor decoding for inference inputs. [`JsonCodec`] is the bundled
//! implementation.

use thiserror::Error;

use crate::types::{Model, Tensor};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode {what}: {reason}")]
    Encode { what: &'static str, reason: String },

    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },
}

/// Serialization capability for node objects.
pub trait ObjectCodec: Send + Sync {
    fn encode_model(&self, model: &Model) -> Result<Vec<u8>, CodecError>;
    fn decode_model(&self, bytes: &[u8]) -> Result<Model, CodecError>;
    fn encode_tensor(&self, tensor: &Tensor) -> Result<Vec<u8>, CodecError>;
    fn decode_tensor(&self, bytes: &[u8]) -> Result<Tensor, CodecError>;
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ObjectCodec for JsonCodec {
    fn encode_model(&self, model: &Model) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(model).map_err(|e| CodecError::Encode {
            what: "model",
            reason: e.to_string(),
        })
    }

    fn decode_model(&self, bytes: &[u8]) -> Result<Model, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
            what: "model",
            reason: e.to_string(),
        })
    }

    fn encode_tensor(&self, tensor: &Tensor) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(tensor).map_err(|e| CodecError::Encode {
            what: "tensor",
            reason: e.to_string(),
        })
    }

    fn decode_tensor(&self, bytes: &[u8]) -> Result<Tensor, CodecError> {
        let tensor: Tensor = serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
            what: "tensor",
            reason: e.to_string(),
        })?;
        if !tensor.is_well_formed() {
            return Err(CodecError::Decode {
                what: "tensor",
                reason: match tensor.element_count() {
                    Some(n) => format!(
                        "shape {:?} needs {n} values, got {}",
                        tensor.shape,
                        tensor.data.len()
                    ),
                    None => format!("shape {:?} is too large", tensor.shape),
                },
            });
        }
        Ok(tensor)
    }
}
