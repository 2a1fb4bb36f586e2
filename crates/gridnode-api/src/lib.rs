//! gridnode-api — request/response surface of a GridNode.
//!
//! Maps each request kind onto the model manager, object store, command
//! relay and node registry, and turns their results into status codes.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/identity/` | Fixed banner identifying a grid node |
//! | GET | `/models/` | List durably stored model ids |
//! | POST | `/models/{model_id}` | Run inference on a stored model |
//! | POST | `/serve-model/` | Save a serialized model |
//! | POST | `/delete-model/` | Delete a model |
//! | GET | `/dataset-tags` | Union of tensor tags in the object store |
//! | POST | `/search` | Whether any tensor carries every queried tag |
//! | GET | `/peers` | Peers this node has connected to |
//! | GET | `/ws` | Event channel: `/set-grid-id`, `/connect-node`, `/cmd` |

pub mod events;
pub mod handlers;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use gridnode_cluster::{GrpcConnector, NodeRegistry, PeerConnector};
use gridnode_models::{InferenceEngine, ModelManager};
use gridnode_relay::CommandRelay;

/// Shared state for handlers.
pub struct ApiState<C: PeerConnector = GrpcConnector> {
    pub models: Arc<ModelManager>,
    pub relay: Arc<CommandRelay>,
    pub registry: Arc<NodeRegistry<C>>,
    pub inference: Arc<dyn InferenceEngine>,
}

impl<C: PeerConnector> Clone for ApiState<C> {
    fn clone(&self) -> Self {
        Self {
            models: Arc::clone(&self.models),
            relay: Arc::clone(&self.relay),
            registry: Arc::clone(&self.registry),
            inference: Arc::clone(&self.inference),
        }
    }
}

/// Build the complete router (HTTP routes + event channel).
pub fn build_router<C: PeerConnector + 'static>(state: ApiState<C>) -> Router {
    Router::new()
        .route("/identity/", get(handlers::identity))
        .route("/models/", get(handlers::list_models::<C>))
        .route("/models/{model_id}", post(handlers::model_inference::<C>))
        .route("/serve-model/", post(handlers::serve_model::<C>))
        .route("/delete-model/", post(handlers::delete_model::<C>))
        .route("/dataset-tags", get(handlers::dataset_tags::<C>))
        .route("/search", post(handlers::search_dataset_tags::<C>))
        .route("/peers", get(handlers::list_peers::<C>))
        .route("/ws", get(events::ws_handler::<C>))
        .with_state(state)
}
