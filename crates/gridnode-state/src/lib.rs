//! gridnode-state — durable store for a GridNode.
//!
//! Backed by [redb](https://docs.rs/redb), holds the node's persisted
//! models, Plan state tensors, and the latest full snapshot of the object
//! store.
//!
//! # Architecture
//!
//! Model blobs are stored verbatim; tensors and snapshots are JSON-serialized
//! into redb's `&[u8]` value columns. Model and tensor ids are unique: an
//! insert for an id that is already present is rejected with
//! [`StateError::Duplicate`] and the transaction is aborted.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and implements both [`ModelRecords`] and [`SnapshotStore`], the contracts
//! the model manager and the command relay are written against.

pub mod error;
pub mod records;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use records::{ModelRecords, SnapshotStore};
pub use store::StateStore;
