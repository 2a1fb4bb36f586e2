//! Node registry — this node's identity plus the peers it has dialed.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use gridnode_core::PeerId;

use crate::connector::PeerConnector;
use crate::error::{RegistryError, RegistryResult};

/// Who this node is in the grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeIdentity {
    pub id: Option<String>,
    /// Client nodes only issue commands; server nodes accept them.
    pub is_client: bool,
}

impl Default for NodeIdentity {
    fn default() -> Self {
        Self {
            id: None,
            is_client: true,
        }
    }
}

/// Result of a connect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    /// Peer id was already registered; nothing was dialed.
    AlreadyKnown,
}

/// Public view of a registered peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerSummary {
    pub id: PeerId,
    pub uri: String,
    /// Unix timestamp (seconds) of the successful connect.
    pub connected_at: u64,
}

struct Peer<T> {
    uri: String,
    /// Held so the peer channel stays open.
    _connection: T,
    connected_at: u64,
}

/// Slot for one peer id. Empty while the first dial is in flight.
type PeerSlot<T> = Arc<OnceCell<Peer<T>>>;

/// Tracks peers by id and dials each at most once.
pub struct NodeRegistry<C: PeerConnector> {
    connector: C,
    /// Locked only to look up or drop a slot, never across a dial.
    peers: Mutex<HashMap<PeerId, PeerSlot<C::Connection>>>,
    identity: RwLock<NodeIdentity>,
}

impl<C: PeerConnector> NodeRegistry<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            peers: Mutex::new(HashMap::new()),
            identity: RwLock::new(NodeIdentity::default()),
        }
    }

    /// Assign this node's grid id and switch it to the server role.
    ///
    /// Later calls overwrite the id.
    pub fn set_node_id(&self, id: &str) {
        let mut identity = self.identity.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = identity.id.as_deref().filter(|p| *p != id) {
            debug!(%previous, %id, "node id overwritten");
        }
        identity.id = Some(id.to_string());
        identity.is_client = false;
        info!(%id, "node identity set");
    }

    pub fn identity(&self) -> NodeIdentity {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Connect to `uri` and register it as `peer_id`, unless already known.
    ///
    /// Concurrent calls for one id share a single dial; calls for other ids
    /// proceed independently.
    pub async fn connect_node(&self, peer_id: &str, uri: &str) -> RegistryResult<ConnectOutcome> {
        let slot = {
            let mut peers = self.peers.lock().await;
            Arc::clone(peers.entry(peer_id.to_string()).or_default())
        };
        if slot.initialized() {
            debug!(%peer_id, "peer already known; not dialing");
            return Ok(ConnectOutcome::AlreadyKnown);
        }

        let mut dialed = false;
        let dialed_here = &mut dialed;
        let result = slot
            .get_or_try_init(move || async move {
                *dialed_here = true;
                let connection = self.connector.connect(uri).await?;
                Ok::<_, String>(Peer {
                    uri: uri.to_string(),
                    _connection: connection,
                    connected_at: epoch_secs(),
                })
            })
            .await;

        match result {
            Ok(_) if dialed => {
                // A failed dial sharing this slot may have dropped it meanwhile.
                self.peers
                    .lock()
                    .await
                    .entry(peer_id.to_string())
                    .or_insert_with(|| Arc::clone(&slot));
                info!(%peer_id, %uri, "peer connected");
                Ok(ConnectOutcome::Connected)
            }
            Ok(_) => Ok(ConnectOutcome::AlreadyKnown),
            Err(reason) => {
                warn!(%peer_id, %uri, %reason, "peer connection failed");
                self.drop_empty_slot(peer_id, &slot).await;
                Err(RegistryError::Connection {
                    peer: peer_id.to_string(),
                    uri: uri.to_string(),
                    reason,
                })
            }
        }
    }

    async fn drop_empty_slot(&self, peer_id: &str, slot: &PeerSlot<C::Connection>) {
        let mut peers = self.peers.lock().await;
        let stale = peers
            .get(peer_id)
            .is_some_and(|s| Arc::ptr_eq(s, slot) && !s.initialized());
        if stale {
            peers.remove(peer_id);
        }
    }

    /// Registered peers sorted by id. Dials still in flight are not listed.
    pub async fn peers(&self) -> Vec<PeerSummary> {
        let peers = self.peers.lock().await;
        let mut summaries: Vec<PeerSummary> = peers
            .iter()
            .filter_map(|(id, slot)| {
                slot.get().map(|p| PeerSummary {
                    id: id.clone(),
                    uri: p.uri.clone(),
                    connected_at: p.connected_at,
                })
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
