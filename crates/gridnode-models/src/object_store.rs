//! Object store — the node's in-memory id → object map.
//!
//! One store exists per node. It is a cheap `Clone` handle; every clone sees
//! the same map. Mutations take the write lock, so registration, removal and
//! bulk restore never interleave.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use gridnode_core::{ObjectId, StoredObject, Tensor};

/// Shared handle to the node's objects.
#[derive(Clone, Default)]
pub struct ObjectStore {
    objects: Arc<RwLock<HashMap<ObjectId, StoredObject>>>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ObjectId, StoredObject>> {
        self.objects.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ObjectId, StoredObject>> {
        self.objects.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an object under its own id. Returns the object it replaced.
    pub fn register(&self, object: StoredObject) -> Option<StoredObject> {
        let id = object.id().to_string();
        let previous = self.write().insert(id.clone(), object);
        debug!(%id, replaced = previous.is_some(), "object registered");
        previous
    }

    /// Register an object only if its id is free. Returns whether it was added.
    pub fn register_new(&self, object: StoredObject) -> bool {
        let mut map = self.write();
        if map.contains_key(object.id()) {
            return false;
        }
        map.insert(object.id().to_string(), object);
        true
    }

    pub fn register_tensor(&self, tensor: Tensor) -> Option<StoredObject> {
        self.register(StoredObject::Tensor(tensor))
    }

    pub fn get(&self, id: &str) -> Option<StoredObject> {
        self.read().get(id).cloned()
    }

    /// Look up a tensor. Models registered under `id` yield `None`.
    pub fn get_tensor(&self, id: &str) -> Option<Tensor> {
        self.read().get(id).and_then(StoredObject::as_tensor).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    pub fn remove(&self, id: &str) -> Option<StoredObject> {
        let removed = self.write().remove(id);
        if removed.is_some() {
            debug!(%id, "object removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Ids of all objects, sorted.
    pub fn ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Copy of every object, sorted by id.
    pub fn snapshot(&self) -> Vec<StoredObject> {
        let mut objects: Vec<StoredObject> = self.read().values().cloned().collect();
        objects.sort_by(|a, b| a.id().cmp(b.id()));
        objects
    }

    /// Register every object whose id is not already live, in one critical
    /// section. Live objects win. Returns how many were added.
    pub fn restore(&self, objects: Vec<StoredObject>) -> usize {
        let mut map = self.write();
        let mut added = 0;
        for object in objects {
            if !map.contains_key(object.id()) {
                map.insert(object.id().to_string(), object);
                added += 1;
            }
        }
        debug!(added, objects = map.len(), "object store restored");
        added
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    /// Union of dataset tags carried by stored tensors.
    pub fn tags(&self) -> BTreeSet<String> {
        self.read()
            .values()
            .flat_map(|o| o.tags().iter().cloned())
            .collect()
    }

    /// Ids of tensors carrying every tag in `query`, sorted.
    pub fn search(&self, query: &[String]) -> Vec<ObjectId> {
        let mut hits: Vec<ObjectId> = self
            .read()
            .values()
            .filter_map(StoredObject::as_tensor)
            .filter(|t| t.matches_tags(query))
            .map(|t| t.id.clone())
            .collect();
        hits.sort();
        hits
    }
}
