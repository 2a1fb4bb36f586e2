//! HTTP handlers.
//!
//! Model manager results carry their own error kind; this module is where
//! those kinds become status codes.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use gridnode_cluster::PeerConnector;
use gridnode_core::transport;
use gridnode_models::ModelError;

use crate::ApiState;

/// Banner returned by `/identity/` so deploy tooling can tell a grid node
/// apart from whatever else answers on the port.
pub const IDENTITY_BANNER: &str = "OpenGrid";

fn error_response(msg: &str, status: StatusCode) -> Response {
    (status, Json(json!({ "success": false, "error": msg }))).into_response()
}

fn status_for(err: &ModelError) -> StatusCode {
    match err {
        ModelError::AlreadyExists(_) => StatusCode::CONFLICT,
        ModelError::NotFound(_) => StatusCode::NOT_FOUND,
        ModelError::Decode(_) => StatusCode::BAD_REQUEST,
        ModelError::Persistence(_) | ModelError::Execution(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// ── Identity ───────────────────────────────────────────────────

/// GET /identity/
pub async fn identity() -> &'static str {
    IDENTITY_BANNER
}

// ── Models ─────────────────────────────────────────────────────

/// GET /models/
pub async fn list_models<C: PeerConnector>(State(state): State<ApiState<C>>) -> Response {
    match state.models.list() {
        Ok(ids) => Json(json!({ "success": true, "models": ids })).into_response(),
        Err(e) => error_response(&e.to_string(), status_for(&e)),
    }
}

/// Body of POST /serve-model/.
#[derive(Debug, Deserialize)]
pub struct ServeModelRequest {
    pub model_id: String,
    /// Hex-encoded serialized model.
    pub model: String,
}

/// POST /serve-model/
pub async fn serve_model<C: PeerConnector>(
    State(state): State<ApiState<C>>,
    Json(req): Json<ServeModelRequest>,
) -> Response {
    let blob = match transport::decode(&req.model) {
        Ok(blob) => blob,
        Err(e) => return error_response(&e.to_string(), StatusCode::BAD_REQUEST),
    };
    debug!(model_id = %req.model_id, bytes = blob.len(), "serve-model request");

    match state.models.save(&blob, &req.model_id) {
        Ok(message) => Json(json!({ "success": true, "message": message })).into_response(),
        Err(e) => error_response(&e.to_string(), status_for(&e)),
    }
}

/// Body of POST /delete-model/.
#[derive(Debug, Deserialize)]
pub struct DeleteModelRequest {
    pub model_id: String,
}

/// POST /delete-model/
pub async fn delete_model<C: PeerConnector>(
    State(state): State<ApiState<C>>,
    Json(req): Json<DeleteModelRequest>,
) -> Response {
    match state.models.delete(&req.model_id) {
        Ok(message) => Json(json!({ "success": true, "message": message })).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::NOT_FOUND),
    }
}

/// Body of POST /models/{model_id}.
#[derive(Debug, Deserialize)]
pub struct InferenceRequest {
    /// Hex-encoded serialized input tensor.
    pub data: String,
}

/// POST /models/{model_id}
pub async fn model_inference<C: PeerConnector>(
    State(state): State<ApiState<C>>,
    Path(model_id): Path<String>,
    Json(req): Json<InferenceRequest>,
) -> Response {
    let input = match transport::decode(&req.data)
        .map_err(|e| e.to_string())
        .and_then(|bytes| {
            state
                .models
                .codec()
                .decode_tensor(&bytes)
                .map_err(|e| e.to_string())
        }) {
        Ok(input) => input,
        Err(e) => return error_response(&e, StatusCode::BAD_REQUEST),
    };

    match state.models.infer(&model_id, input, state.inference.as_ref()) {
        Ok(output) => Json(json!({
            "success": true,
            "prediction": output.data,
            "shape": output.shape,
        }))
        .into_response(),
        Err(e) => error_response(&e.to_string(), status_for(&e)),
    }
}

// ── Dataset tags ───────────────────────────────────────────────

/// GET /dataset-tags
pub async fn dataset_tags<C: PeerConnector>(State(state): State<ApiState<C>>) -> Response {
    let tags: Vec<String> = state.relay.objects().tags().into_iter().collect();
    Json(tags).into_response()
}

/// POST /search
pub async fn search_dataset_tags<C: PeerConnector>(
    State(state): State<ApiState<C>>,
    Json(body): Json<Value>,
) -> Response {
    let Some(query) = body.get("query").and_then(Value::as_array) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let query: Vec<String> = query
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();

    let hits = state.relay.objects().search(&query);
    Json(json!({ "content": !hits.is_empty() })).into_response()
}

// ── Peers ──────────────────────────────────────────────────────

/// GET /peers
pub async fn list_peers<C: PeerConnector>(State(state): State<ApiState<C>>) -> Response {
    Json(json!({
        "node": state.registry.identity(),
        "peers": state.registry.peers().await,
    }))
    .into_response()
}
