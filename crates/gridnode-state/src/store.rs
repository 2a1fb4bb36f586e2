//! StateStore — redb-backed persistence for a GridNode.
//!
//! Provides unique-id model and tensor records plus a single-row object
//! store snapshot. The store supports both on-disk and in-memory backends
//! (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use gridnode_core::{ObjectId, StoredObject, Tensor};

use crate::error::{StateError, StateResult};
use crate::records::{ModelRecords, SnapshotStore};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(MODELS).map_err(map_err!(Table))?;
        txn.open_table(TENSORS).map_err(map_err!(Table))?;
        txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Models ─────────────────────────────────────────────────────

    /// Insert a model blob. Rejects an id that is already stored.
    pub fn insert_model(&self, id: &str, blob: &[u8]) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let duplicate = {
            let mut table = txn.open_table(MODELS).map_err(map_err!(Table))?;
            let exists = table.get(id).map_err(map_err!(Read))?.is_some();
            if !exists {
                table.insert(id, blob).map_err(map_err!(Write))?;
            }
            exists
        };
        if duplicate {
            txn.abort().map_err(map_err!(Transaction))?;
            debug!(%id, "model insert rejected: duplicate id");
            return Err(StateError::Duplicate(id.to_string()));
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%id, bytes = blob.len(), "model stored");
        Ok(())
    }

    /// Get a model blob by id.
    pub fn get_model(&self, id: &str) -> StateResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(MODELS).map_err(map_err!(Table))?;
        let blob = table
            .get(id)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_vec());
        Ok(blob)
    }

    /// Delete a model by id. Returns true if it existed.
    pub fn delete_model(&self, id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(MODELS).map_err(map_err!(Table))?;
            existed = table.remove(id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%id, existed, "model deleted");
        Ok(existed)
    }

    /// List the ids of every stored model.
    pub fn list_model_ids(&self) -> StateResult<Vec<ObjectId>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(MODELS).map_err(map_err!(Table))?;
        let mut ids = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            ids.push(key.value().to_string());
        }
        Ok(ids)
    }

    // ── Tensors ────────────────────────────────────────────────────

    /// Insert a batch of tensors atomically. A duplicate id aborts the batch.
    pub fn insert_tensors(&self, tensors: &[Tensor]) -> StateResult<()> {
        let mut encoded = Vec::with_capacity(tensors.len());
        for tensor in tensors {
            let value = serde_json::to_vec(tensor).map_err(map_err!(Serialize))?;
            encoded.push((tensor.id.as_str(), value));
        }

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let duplicate = {
            let mut table = txn.open_table(TENSORS).map_err(map_err!(Table))?;
            let mut duplicate = None;
            for (id, value) in &encoded {
                let exists = table.get(*id).map_err(map_err!(Read))?.is_some();
                if exists {
                    duplicate = Some(id.to_string());
                    break;
                }
                table
                    .insert(*id, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
            duplicate
        };
        if let Some(id) = duplicate {
            txn.abort().map_err(map_err!(Transaction))?;
            debug!(%id, "tensor batch rejected: duplicate id");
            return Err(StateError::Duplicate(id));
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(count = encoded.len(), "tensors stored");
        Ok(())
    }

    /// Get a tensor by id.
    pub fn get_tensor(&self, id: &str) -> StateResult<Option<Tensor>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TENSORS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let tensor: Tensor =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(tensor))
            }
            None => Ok(None),
        }
    }

    // ── Snapshots ──────────────────────────────────────────────────

    /// Overwrite the latest object store image.
    pub fn write_snapshot(&self, objects: &[StoredObject]) -> StateResult<()> {
        let value = serde_json::to_vec(objects).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
            table
                .insert(LATEST_SNAPSHOT, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(objects = objects.len(), bytes = value.len(), "snapshot written");
        Ok(())
    }

    /// Read the latest object store image. Empty if none was written.
    pub fn read_snapshot(&self) -> StateResult<Vec<StoredObject>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
        match table.get(LATEST_SNAPSHOT).map_err(map_err!(Read))? {
            Some(guard) => {
                let objects: Vec<StoredObject> =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(objects)
            }
            None => Ok(Vec::new()),
        }
    }
}

impl ModelRecords for StateStore {
    fn insert_model(&self, id: &str, blob: &[u8]) -> StateResult<()> {
        StateStore::insert_model(self, id, blob)
    }

    fn get_model(&self, id: &str) -> StateResult<Option<Vec<u8>>> {
        StateStore::get_model(self, id)
    }

    fn delete_model(&self, id: &str) -> StateResult<bool> {
        StateStore::delete_model(self, id)
    }

    fn list_model_ids(&self) -> StateResult<Vec<ObjectId>> {
        StateStore::list_model_ids(self)
    }

    fn insert_tensors(&self, tensors: &[Tensor]) -> StateResult<()> {
        StateStore::insert_tensors(self, tensors)
    }

    fn get_tensor(&self, id: &str) -> StateResult<Option<Tensor>> {
        StateStore::get_tensor(self, id)
    }
}

impl SnapshotStore for StateStore {
    fn snapshot(&self, objects: &[StoredObject]) -> StateResult<()> {
        self.write_snapshot(objects)
    }

    fn recover(&self) -> StateResult<Vec<StoredObject>> {
        self.read_snapshot()
    }
}
