//! WebSocket event channel.
//!
//! Every frame is a JSON envelope `{"event": ..., "data": ...}`. A new
//! session is greeted with `/connect-response`; after that each inbound
//! event produces at most one outbound event.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use gridnode_cluster::{ConnectOutcome, PeerConnector};

use crate::ApiState;

#[derive(Debug, Clone, Deserialize)]
pub struct InboundEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEvent {
    pub event: String,
    pub data: Value,
}

impl OutboundEvent {
    fn new(event: &str, data: Value) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }
}

/// GET /ws
pub async fn ws_handler<C: PeerConnector + 'static>(
    ws: WebSocketUpgrade,
    State(state): State<ApiState<C>>,
) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, state))
}

async fn run_session<C: PeerConnector + 'static>(mut socket: WebSocket, state: ApiState<C>) {
    let greeting = OutboundEvent::new("/connect-response", json!({ "status": "connected" }));
    if send(&mut socket, &greeting).await.is_err() {
        return;
    }
    debug!("event session opened");

    while let Some(frame) = socket.recv().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(error = %e, "event session read failed");
                break;
            }
        };

        let event: InboundEvent = match serde_json::from_str(text.as_str()) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "malformed event frame");
                continue;
            }
        };

        if let Some(reply) = dispatch(&state, event).await {
            if send(&mut socket, &reply).await.is_err() {
                break;
            }
        }
    }
    debug!("event session closed");
}

async fn send(socket: &mut WebSocket, event: &OutboundEvent) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    socket.send(Message::Text(text.into())).await
}

/// Handle one inbound event.
pub async fn dispatch<C: PeerConnector + 'static>(
    state: &ApiState<C>,
    event: InboundEvent,
) -> Option<OutboundEvent> {
    match event.event.as_str() {
        "/set-grid-id" => {
            match event.data.get("id").and_then(Value::as_str) {
                Some(id) => state.registry.set_node_id(id),
                None => warn!("/set-grid-id without an id"),
            }
            None
        }
        "/connect-node" => {
            let id = event.data.get("id").and_then(Value::as_str);
            let uri = event.data.get("uri").and_then(Value::as_str);
            let message = match (id, uri) {
                (Some(id), Some(uri)) => match state.registry.connect_node(id, uri).await {
                    Ok(ConnectOutcome::Connected) => "Successfully connected!".to_string(),
                    Ok(ConnectOutcome::AlreadyKnown) => return None,
                    Err(e) => e.to_string(),
                },
                (None, _) => "missing field: id".to_string(),
                (_, None) => "missing field: uri".to_string(),
            };
            Some(OutboundEvent::new(
                "/connect-node-response",
                json!({ "id": id, "message": message }),
            ))
        }
        "/cmd" => {
            let Some(message) = event.data.get("message").and_then(Value::as_str) else {
                return Some(OutboundEvent::new(
                    "/cmd-response",
                    json!("decode error: missing message"),
                ));
            };
            let message = message.to_string();
            let relay = state.relay.clone();
            let response = match tokio::task::spawn_blocking(move || relay.handle(&message)).await
            {
                Ok(response) => response,
                Err(e) => format!("command task failed: {e}"),
            };
            Some(OutboundEvent::new("/cmd-response", json!(response)))
        }
        other => {
            info!(event = %other, "ignoring unknown event");
            None
        }
    }
}
