//! HTTP route handlers for the signaling surface.
//!
//! `POST /api/offer` runs the whole negotiation: verify the caller,
//! create the session, return the answer, and start the pipeline. The
//! client then trickles candidates to `POST /api/candidate` using the
//! returned `pc_id`.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use voxlink_core::candidate::CandidateDescriptor;
use voxlink_core::error::VoxlinkError;

use crate::auth::{Identity, bearer_token};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OfferRequest {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Serialize)]
pub struct OfferResponse {
    pub pc_id: String,
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct CandidateRequest {
    pub pc_id: String,
    #[serde(default)]
    pub candidates: Vec<CandidateDescriptor>,
}

/// Error shape returned to clients, status derived from the error kind.
pub struct ApiError(VoxlinkError);

impl From<VoxlinkError> for ApiError {
    fn from(err: VoxlinkError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            VoxlinkError::Auth(_) => StatusCode::UNAUTHORIZED,
            VoxlinkError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<Identity>, ApiError> {
    let Some(verifier) = &state.verifier else {
        return Ok(None);
    };
    let token = bearer_token(headers)
        .ok_or_else(|| VoxlinkError::Auth("missing bearer token".into()))?;
    let identity = verifier.verify(token).await?;
    Ok(Some(identity))
}

/// Negotiate a new session from the remote offer and start its pipeline.
pub async fn offer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<OfferRequest>,
) -> Result<Json<OfferResponse>, ApiError> {
    let identity = authenticate(&state, &headers).await?;

    let answer = state
        .negotiation
        .create_session(&request.sdp, &request.kind)
        .await?;

    let display_name = identity.as_ref().and_then(|i| i.display_name.clone());
    state
        .negotiation
        .start_session(&answer.session_id, display_name)
        .await?;

    info!(
        session_id = %answer.session_id,
        user_id = identity.as_ref().map(|i| i.id.as_str()).unwrap_or("anonymous"),
        "Offer answered"
    );

    Ok(Json(OfferResponse {
        pc_id: answer.session_id,
        sdp: answer.answer_sdp,
        kind: answer.answer_type,
    }))
}

/// Apply a batch of trickled candidates to an existing session.
pub async fn candidate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CandidateRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .negotiation
        .attach_candidates(&request.pc_id, &request.candidates)
        .await?;
    Ok(Json(json!({ "status": "ok" })))
}

/// Connection bootstrap info for clients.
pub async fn connection_info(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "transport": "webrtc",
        "ice_servers": state.config.ice_servers(),
    }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.registry.len().await,
    }))
}
