//! gridnode-models — node-local objects and the model lifecycle.
//!
//! # Architecture
//!
//! ```text
//! ModelManager
//!   ├── ModelCache      model_id → decoded Model (one mutex, held per operation)
//!   ├── ModelRecords    durable, unique-id model and tensor rows (gridnode-state)
//!   └── ObjectStore     shared id → tensor/model map, Plan state lands here
//! ```
//!
//! The cache answers repeated `get` calls without touching durable storage;
//! `list` and `delete` always go to durable storage. A save that collides
//! with a durable record the cache does not know about repairs the cache
//! from that record before reporting the duplicate.

pub mod cache;
pub mod error;
pub mod inference;
pub mod manager;
pub mod object_store;

pub use cache::ModelCache;
pub use error::{EngineError, ModelError, ModelResult};
pub use inference::{DenseEngine, InferenceEngine};
pub use manager::ModelManager;
pub use object_store::ObjectStore;
