//! gridnode-cluster — peer bookkeeping for a GridNode.
//!
//! # Architecture
//!
//! ```text
//! NodeRegistry<C: PeerConnector>
//!   ├── NodeIdentity    this node's grid id and role
//!   ├── peers           peer_id → slot (OnceCell<Peer { uri, connection }>)
//!   └── C               dials a uri; GrpcConnector opens a tonic channel
//! ```
//!
//! Connecting is idempotent per peer id: a known peer is never dialed again.
//! There is no membership protocol; peers are whatever this node was told
//! to connect to.

pub mod connector;
pub mod error;
pub mod registry;

pub use connector::{ConnectFuture, GrpcConnector, PeerConnector};
pub use error::{RegistryError, RegistryResult};
pub use registry::{ConnectOutcome, NodeIdentity, NodeRegistry, PeerSummary};
