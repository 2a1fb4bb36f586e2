//! redb table definitions for the GridNode state store.
//!
//! Each table uses `&str` keys and `&[u8]` values.

use redb::TableDefinition;

/// Serialized model blobs keyed by `{model_id}`.
pub const MODELS: TableDefinition<&str, &[u8]> = TableDefinition::new("models");

/// Plan state tensors (JSON) keyed by `{tensor_id}`.
pub const TENSORS: TableDefinition<&str, &[u8]> = TableDefinition::new("tensors");

/// Object store images (JSON) keyed by [`LATEST_SNAPSHOT`].
pub const SNAPSHOTS: TableDefinition<&str, &[u8]> = TableDefinition::new("snapshots");

/// Key of the single snapshot row that recovery reads.
pub const LATEST_SNAPSHOT: &str = "latest";
