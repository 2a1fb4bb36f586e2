//! Model cache — decoded models ready for execution.

use std::collections::HashMap;
use std::sync::Arc;

use gridnode_core::{Model, ObjectId};

/// In-memory `model_id → Model` map with at most one entry per id.
///
/// Entries are only dropped by `remove` or `clear`; there is no eviction.
#[derive(Debug, Default)]
pub struct ModelCache {
    entries: HashMap<ObjectId, Arc<Model>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.entries.contains_key(model_id)
    }

    pub fn get(&self, model_id: &str) -> Option<Arc<Model>> {
        self.entries.get(model_id).cloned()
    }

    /// Insert unless an entry already exists. Returns the entry now cached.
    pub fn insert(&mut self, model_id: &str, model: Arc<Model>) -> Arc<Model> {
        self.entries
            .entry(model_id.to_string())
            .or_insert(model)
            .clone()
    }

    pub fn remove(&mut self, model_id: &str) -> Option<Arc<Model>> {
        self.entries.remove(model_id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
