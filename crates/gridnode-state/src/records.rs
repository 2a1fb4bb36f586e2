//! Storage contracts consumed by the model manager and the command relay.
//!
//! [`crate::StateStore`] implements both traits; tests substitute
//! instrumented or failing implementations.

use gridnode_core::{ObjectId, StoredObject, Tensor};

use crate::error::StateResult;

/// Durable model and tensor records with id uniqueness.
pub trait ModelRecords: Send + Sync {
    /// Persist a model blob. Fails with `StateError::Duplicate` if the id exists.
    fn insert_model(&self, id: &str, blob: &[u8]) -> StateResult<()>;

    fn get_model(&self, id: &str) -> StateResult<Option<Vec<u8>>>;

    /// Delete a model record. Returns true if it existed.
    fn delete_model(&self, id: &str) -> StateResult<bool>;

    fn list_model_ids(&self) -> StateResult<Vec<ObjectId>>;

    /// Persist tensors in one transaction. Any duplicate id aborts the batch.
    fn insert_tensors(&self, tensors: &[Tensor]) -> StateResult<()>;

    fn get_tensor(&self, id: &str) -> StateResult<Option<Tensor>>;
}

/// Full-image snapshots of the object store.
pub trait SnapshotStore: Send + Sync {
    /// Replace the stored image with `objects`.
    fn snapshot(&self, objects: &[StoredObject]) -> StateResult<()>;

    /// Return the last image, or an empty list if none was ever written.
    fn recover(&self) -> StateResult<Vec<StoredObject>>;
}
