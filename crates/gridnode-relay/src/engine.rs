//! Execution engine seam and the bundled object command engine.

use serde::{Deserialize, Serialize};
use tracing::debug;

use gridnode_core::{ObjectId, Tensor};
use gridnode_models::{EngineError, ObjectStore};

/// Runs one raw command against the node's objects.
///
/// The relay treats both the command bytes and the response bytes as
/// opaque. Implementations may register or remove objects.
pub trait ExecutionEngine: Send + Sync {
    fn execute(&self, command: &[u8], objects: &ObjectStore) -> Result<Vec<u8>, EngineError>;
}

/// JSON command understood by [`ObjectCommandEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Register { tensor: Tensor },
    Fetch { id: ObjectId },
    Delete { id: ObjectId },
    List,
    Search { query: Vec<String> },
}

/// JSON reply produced by [`ObjectCommandEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandReply {
    Ok,
    Tensor { tensor: Tensor },
    Ids { ids: Vec<ObjectId> },
}

/// Engine that manipulates tensors in the object store.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectCommandEngine;

impl ObjectCommandEngine {
    fn run(&self, command: Command, objects: &ObjectStore) -> Result<CommandReply, EngineError> {
        match command {
            Command::Register { tensor } => {
                if !tensor.is_well_formed() {
                    return Err(EngineError::InvalidInput(format!(
                        "tensor {} shape {:?} does not fit {} values",
                        tensor.id,
                        tensor.shape,
                        tensor.data.len()
                    )));
                }
                objects.register_tensor(tensor);
                Ok(CommandReply::Ok)
            }
            Command::Fetch { id } => objects
                .get_tensor(&id)
                .map(|tensor| CommandReply::Tensor { tensor })
                .ok_or(EngineError::MissingObject(id)),
            Command::Delete { id } => objects
                .remove(&id)
                .map(|_| CommandReply::Ok)
                .ok_or(EngineError::MissingObject(id)),
            Command::List => Ok(CommandReply::Ids { ids: objects.ids() }),
            Command::Search { query } => Ok(CommandReply::Ids {
                ids: objects.search(&query),
            }),
        }
    }
}

impl ExecutionEngine for ObjectCommandEngine {
    fn execute(&self, command: &[u8], objects: &ObjectStore) -> Result<Vec<u8>, EngineError> {
        let command: Command = serde_json::from_slice(command)
            .map_err(|e| EngineError::InvalidInput(e.to_string()))?;
        debug!(?command, "executing object command");
        let reply = self.run(command, objects)?;
        serde_json::to_vec(&reply).map_err(|e| EngineError::InvalidInput(e.to_string()))
    }
}
