//! gridnode-relay — remote command handling for a GridNode.
//!
//! ```text
//! hex message ─▶ CommandRelay
//!                  ├── object store empty? ─▶ SnapshotStore::recover
//!                  ├── hex decode
//!                  ├── ExecutionEngine::execute (may mutate ObjectStore)
//!                  ├── SnapshotStore::snapshot (full image, every command)
//!                  └── hex encode ─▶ response
//! ```
//!
//! Failures never leave the relay: `CommandRelay::handle` answers with the
//! error text in place of the response.

pub mod engine;
pub mod error;
pub mod relay;

pub use engine::{Command, CommandReply, ExecutionEngine, ObjectCommandEngine};
pub use error::{RelayError, RelayResult};
pub use relay::CommandRelay;
