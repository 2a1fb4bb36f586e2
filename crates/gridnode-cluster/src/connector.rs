//! Peer connectors — injected so the registry can be tested without a
//! network.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tonic::transport::{Channel, Endpoint};
use tracing::debug;

/// Boxed future alias for connection attempts.
pub type ConnectFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send + 'a>>;

/// Establishes a connection handle to a peer uri.
pub trait PeerConnector: Send + Sync {
    type Connection: Clone + Send + Sync + 'static;

    fn connect<'a>(&'a self, uri: &'a str) -> ConnectFuture<'a, Self::Connection>;
}

/// Opens a tonic channel to the peer.
#[derive(Debug, Clone, Default)]
pub struct GrpcConnector {
    connect_timeout: Option<Duration>,
}

impl GrpcConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound each connection attempt.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

impl PeerConnector for GrpcConnector {
    type Connection = Channel;

    fn connect<'a>(&'a self, uri: &'a str) -> ConnectFuture<'a, Channel> {
        Box::pin(async move {
            let mut endpoint =
                Endpoint::from_shared(uri.to_string()).map_err(|e| e.to_string())?;
            if let Some(timeout) = self.connect_timeout {
                endpoint = endpoint.connect_timeout(timeout);
            }
            let channel = endpoint.connect().await.map_err(|e| e.to_string())?;
            debug!(%uri, "peer channel established");
            Ok(channel)
        })
    }
}
