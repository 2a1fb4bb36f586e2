//! Inference engines — run a decoded model against an input tensor.
//!
//! The node only needs the [`InferenceEngine`] seam; numeric execution is a
//! collaborator concern. [`DenseEngine`] is the bundled engine: a plain
//! model passes its input through unchanged, and a Plan computes one dense
//! layer `W·x + b` from its state tensors `[weight, bias?]`.

use gridnode_core::{Model, ModelKind, Tensor};

use crate::error::EngineError;
use crate::object_store::ObjectStore;

/// Executes a model. Plan state must already be in `objects`.
pub trait InferenceEngine: Send + Sync {
    fn infer(
        &self,
        model: &Model,
        input: &Tensor,
        objects: &ObjectStore,
    ) -> Result<Tensor, EngineError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DenseEngine;

impl InferenceEngine for DenseEngine {
    fn infer(
        &self,
        model: &Model,
        input: &Tensor,
        objects: &ObjectStore,
    ) -> Result<Tensor, EngineError> {
        let output_id = format!("{}:prediction", input.id);
        let state_ids = match &model.kind {
            ModelKind::Plain => {
                return Ok(Tensor::new(output_id, input.shape.clone(), input.data.clone()));
            }
            ModelKind::Plan { state_ids } => state_ids,
        };

        let weight_id = state_ids
            .first()
            .ok_or_else(|| EngineError::Unsupported("plan has no weight tensor".into()))?;
        let weight = objects
            .get_tensor(weight_id)
            .ok_or_else(|| EngineError::MissingObject(weight_id.clone()))?;
        let bias = match state_ids.get(1) {
            Some(id) => Some(
                objects
                    .get_tensor(id)
                    .ok_or_else(|| EngineError::MissingObject(id.clone()))?,
            ),
            None => None,
        };

        let [rows, cols] = weight.shape[..] else {
            return Err(EngineError::InvalidInput(format!(
                "weight {} must be 2-d, got shape {:?}",
                weight.id, weight.shape
            )));
        };
        if rows == 0 || cols == 0 {
            return Err(EngineError::InvalidInput(format!(
                "weight {} has an empty dimension, shape {:?}",
                weight.id, weight.shape
            )));
        }
        // Stored weights are not shape-checked on the way in.
        if rows.checked_mul(cols) != Some(weight.data.len()) {
            return Err(EngineError::InvalidInput(format!(
                "weight {} has {} values for shape {:?}",
                weight.id,
                weight.data.len(),
                weight.shape
            )));
        }
        if let Some(b) = &bias {
            if b.data.len() != rows {
                return Err(EngineError::InvalidInput(format!(
                    "bias {} has {} values, weight has {rows} rows",
                    b.id,
                    b.data.len()
                )));
            }
        }

        // Accept a single vector [cols] or a batch [n, cols].
        let (batch, batched) = match input.shape[..] {
            [c] if c == cols => (1, false),
            [n, c] if c == cols => (n, true),
            _ => {
                return Err(EngineError::InvalidInput(format!(
                    "input shape {:?} does not match weight columns {cols}",
                    input.shape
                )));
            }
        };
        if batch.checked_mul(cols) != Some(input.data.len()) {
            return Err(EngineError::InvalidInput(format!(
                "input {} has {} values for shape {:?}",
                input.id,
                input.data.len(),
                input.shape
            )));
        }

        let mut out = Vec::with_capacity(batch * rows);
        for x in input.data.chunks(cols) {
            for r in 0..rows {
                let w = &weight.data[r * cols..(r + 1) * cols];
                let dot: f32 = w.iter().zip(x).map(|(a, b)| a * b).sum();
                out.push(dot + bias.as_ref().map_or(0.0, |b| b.data[r]));
            }
        }

        let shape = if batched { vec![batch, rows] } else { vec![rows] };
        Ok(Tensor::new(output_id, shape, out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn objects_with_layer() -> ObjectStore {
        let objects = ObjectStore::new();
        // 2x3 weight, 2 bias
        objects.register_tensor(Tensor::new(
            "w",
            vec![2, 3],
            vec![1.0, 0.0, 0.0, 0.0, 1.0, 1.0],
        ));
        objects.register_tensor(Tensor::new("b", vec![2], vec![0.5, -1.0]));
        objects
    }

    #[test]
    fn plain_model_echoes_input() {
        let input = Tensor::new("x", vec![2], vec![3.0, 4.0]);
        let out = DenseEngine
            .infer(&Model::plain(vec![]), &input, &ObjectStore::new())
            .unwrap();
        assert_eq!(out.id, "x:prediction");
        assert_eq!(out.data, input.data);
    }

    #[test]
    fn plan_computes_dense_layer() {
        let objects = objects_with_layer();
        let plan = Model::plan(vec!["w".into(), "b".into()], vec![]);
        let input = Tensor::new("x", vec![3], vec![1.0, 2.0, 3.0]);

        let out = DenseEngine.infer(&plan, &input, &objects).unwrap();
        assert_eq!(out.shape, vec![2]);
        assert_eq!(out.data, vec![1.5, 4.0]);
    }

    #[test]
    fn plan_handles_batches_without_bias() {
        let objects = objects_with_layer();
        let plan = Model::plan(vec!["w".into()], vec![]);
        let input = Tensor::new("x", vec![2, 3], vec![1.0, 0.0, 0.0, 0.0, 1.0, 1.0]);

        let out = DenseEngine.infer(&plan, &input, &objects).unwrap();
        assert_eq!(out.shape, vec![2, 2]);
        assert_eq!(out.data, vec![1.0, 0.0, 0.0, 2.0]);
    }

    #[test]
    fn plan_without_registered_state_fails() {
        let plan = Model::plan(vec!["w".into()], vec![]);
        let input = Tensor::new("x", vec![3], vec![0.0; 3]);
        let err = DenseEngine
            .infer(&plan, &input, &ObjectStore::new())
            .unwrap_err();
        assert_eq!(err, EngineError::MissingObject("w".into()));
    }

    #[test]
    fn mismatched_input_rejected() {
        let objects = objects_with_layer();
        let plan = Model::plan(vec!["w".into(), "b".into()], vec![]);
        let input = Tensor::new("x", vec![4], vec![0.0; 4]);
        assert!(matches!(
            DenseEngine.infer(&plan, &input, &objects),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn zero_width_weight_is_rejected() {
        let objects = ObjectStore::new();
        objects.register_tensor(Tensor::new("w", vec![2, 0], vec![]));
        let plan = Model::plan(vec!["w".into()], vec![]);
        let input = Tensor::new("x", vec![0], vec![]);

        assert!(matches!(
            DenseEngine.infer(&plan, &input, &objects),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn weight_with_short_data_is_rejected() {
        let objects = ObjectStore::new();
        // Shape says 2x3, only four values stored.
        objects.register_tensor(Tensor::new("w", vec![2, 3], vec![1.0; 4]));
        let plan = Model::plan(vec!["w".into()], vec![]);
        let input = Tensor::new("x", vec![3], vec![1.0; 3]);

        let err = DenseEngine.infer(&plan, &input, &objects).unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidInput("weight w has 4 values for shape [2, 3]".into())
        );
    }
}
