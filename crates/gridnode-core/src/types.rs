//! Shared types used across GridNode crates.

use serde::{Deserialize, Serialize};

/// Identifier naming a tensor, model, or other object held by one node.
pub type ObjectId = String;

/// Identifier of a peer node in the grid.
pub type PeerId = String;

// ── Tensor ────────────────────────────────────────────────────────

/// Numeric payload registered in the object store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub id: ObjectId,
    /// Dimensions, outermost first. Empty for a scalar.
    pub shape: Vec<usize>,
    /// Row-major values; `data.len()` equals the product of `shape`.
    pub data: Vec<f32>,
    /// Free-form dataset tags used by tag search.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Tensor {
    /// Build an untagged tensor.
    pub fn new(id: impl Into<ObjectId>, shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            shape,
            data,
            tags: Vec::new(),
        }
    }

    /// Attach dataset tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Number of elements implied by the shape, `None` if it overflows.
    pub fn element_count(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }

    /// Whether the data length agrees with the shape.
    pub fn is_well_formed(&self) -> bool {
        self.element_count() == Some(self.data.len())
    }

    /// True when every tag in `query` is carried by this tensor.
    pub fn matches_tags(&self, query: &[String]) -> bool {
        !query.is_empty() && query.iter().all(|q| self.tags.iter().any(|t| t == q))
    }
}

// ── Model ─────────────────────────────────────────────────────────

/// Executable shape of a model, resolved once when it is decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelKind {
    /// Self-contained artifact.
    Plain,
    /// Parametrized artifact whose state tensors live in the object store.
    Plan { state_ids: Vec<ObjectId> },
}

/// A deserialized model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub kind: ModelKind,
    /// Opaque executable artifact interpreted by the inference engine.
    #[serde(default)]
    pub program: Vec<u8>,
}

impl Model {
    pub fn plain(program: Vec<u8>) -> Self {
        Self {
            kind: ModelKind::Plain,
            program,
        }
    }

    pub fn plan(state_ids: Vec<ObjectId>, program: Vec<u8>) -> Self {
        Self {
            kind: ModelKind::Plan { state_ids },
            program,
        }
    }

    /// State tensor ids this model depends on. Empty for plain models.
    pub fn state_ids(&self) -> &[ObjectId] {
        match &self.kind {
            ModelKind::Plain => &[],
            ModelKind::Plan { state_ids } => state_ids,
        }
    }

    pub fn is_plan(&self) -> bool {
        matches!(self.kind, ModelKind::Plan { .. })
    }
}

// ── Stored objects ────────────────────────────────────────────────

/// Unit held by the object store and written into snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "object", rename_all = "snake_case")]
pub enum StoredObject {
    Tensor(Tensor),
    Model { id: ObjectId, model: Model },
}

impl StoredObject {
    pub fn id(&self) -> &str {
        match self {
            StoredObject::Tensor(t) => &t.id,
            StoredObject::Model { id, .. } => id,
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            StoredObject::Tensor(t) => Some(t),
            StoredObject::Model { .. } => None,
        }
    }

    pub fn tags(&self) -> &[String] {
        match self {
            StoredObject::Tensor(t) => &t.tags,
            StoredObject::Model { .. } => &[],
        }
    }
}

impl From<Tensor> for StoredObject {
    fn from(tensor: Tensor) -> Self {
        StoredObject::Tensor(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_exposes_state_ids() {
        let plan = Model::plan(vec!["w".into(), "b".into()], vec![]);
        assert!(plan.is_plan());
        assert_eq!(plan.state_ids(), ["w".to_string(), "b".to_string()]);

        let plain = Model::plain(vec![1, 2, 3]);
        assert!(!plain.is_plan());
        assert!(plain.state_ids().is_empty());
    }

    #[test]
    fn tensor_shape_check() {
        assert!(Tensor::new("t", vec![2, 2], vec![1.0; 4]).is_well_formed());
        assert!(!Tensor::new("t", vec![3], vec![1.0; 4]).is_well_formed());
        assert!(Tensor::new("s", vec![], vec![7.0]).is_well_formed());
    }

    #[test]
    fn overflowing_shape_is_malformed() {
        let t = Tensor::new("big", vec![usize::MAX, 2], vec![]);
        assert_eq!(t.element_count(), None);
        assert!(!t.is_well_formed());
        // Wraps to zero under unchecked multiplication.
        let wrap = Tensor::new("wrap", vec![1 << (usize::BITS - 1), 2], vec![]);
        assert!(!wrap.is_well_formed());
    }

    #[test]
    fn tag_match_requires_every_term() {
        let t = Tensor::new("t", vec![1], vec![0.0]).with_tags(["#mnist", "#train"]);
        assert!(t.matches_tags(&["#mnist".into()]));
        assert!(t.matches_tags(&["#mnist".into(), "#train".into()]));
        assert!(!t.matches_tags(&["#mnist".into(), "#test".into()]));
        assert!(!t.matches_tags(&[]));
    }

    #[test]
    fn stored_object_json_is_tagged() {
        let obj = StoredObject::Model {
            id: "m".into(),
            model: Model::plain(vec![]),
        };
        let json = serde_json::to_value(&obj).unwrap();
        assert_eq!(json["object"], "model");
        assert_eq!(json["model"]["kind"]["type"], "plain");
    }
}
