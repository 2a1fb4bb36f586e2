//! Shared fixtures for handler and event tests.

use std::sync::Arc;

use gridnode_cluster::{ConnectFuture, NodeRegistry, PeerConnector};
use gridnode_core::JsonCodec;
use gridnode_models::{DenseEngine, ModelManager, ObjectStore};
use gridnode_relay::{CommandRelay, ObjectCommandEngine};
use gridnode_state::StateStore;

use crate::ApiState;

/// Accepts any uri except ones containing "refuse".
#[derive(Debug, Clone, Default)]
pub struct FakeConnector;

impl PeerConnector for FakeConnector {
    type Connection = String;

    fn connect<'a>(&'a self, uri: &'a str) -> ConnectFuture<'a, String> {
        Box::pin(async move {
            if uri.contains("refuse") {
                Err("connection refused".to_string())
            } else {
                Ok(uri.to_string())
            }
        })
    }
}

pub fn test_state() -> ApiState<FakeConnector> {
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    let objects = ObjectStore::new();
    ApiState {
        models: Arc::new(ModelManager::new(
            store.clone(),
            objects.clone(),
            Arc::new(JsonCodec),
        )),
        relay: Arc::new(CommandRelay::new(
            objects,
            Arc::new(ObjectCommandEngine),
            store,
        )),
        registry: Arc::new(NodeRegistry::new(FakeConnector)),
        inference: Arc::new(DenseEngine),
    }
}
