//! Routes for the Session Identity & Presence surface.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router, routing::post};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use trivia_core::model::VerifiedIdentity;
use trivia_lobby::application::lobby::ConnectResult;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /connect. The identity has already been verified
/// by the identity collaborator.
#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    /// Verified user id.
    pub user_id: String,
    /// Verified display name.
    pub display_name: String,
    /// Whether the account is on the free tier.
    #[serde(default)]
    pub free_tier: bool,
    /// Transport connection id; generated when absent.
    pub connection_id: Option<Uuid>,
}

/// Request body for POST /activity.
#[derive(Debug, Deserialize)]
pub struct ActivityRequest {
    /// The reporting connection.
    pub connection_id: Uuid,
    /// Visibility change, if any.
    pub hidden: Option<bool>,
}

/// Request body for POST /disconnect.
#[derive(Debug, Deserialize)]
pub struct DisconnectRequest {
    /// The closing connection.
    pub connection_id: Uuid,
}

/// Response body for POST /disconnect.
#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    /// Whether a live session was torn down.
    pub disconnected: bool,
}

/// POST /connect
#[instrument(skip(state, request), fields(user_id = %request.user_id))]
async fn connect(
    State(state): State<AppState>,
    Json(request): Json<ConnectRequest>,
) -> Result<Json<ConnectResult>, ApiError> {
    let identity = VerifiedIdentity {
        user_id: request.user_id,
        display_name: request.display_name,
        free_tier: request.free_tier,
    };
    let connection_id = request.connection_id.unwrap_or_else(Uuid::new_v4);

    let result = state.lobby.connect(&identity, connection_id).await?;
    if let Some(superseded) = result.superseded {
        info!(%connection_id, %superseded, "older connection superseded");
    }

    Ok(Json(result))
}

/// POST /activity
#[instrument(skip(state, request), fields(connection_id = %request.connection_id))]
async fn activity(
    State(state): State<AppState>,
    Json(request): Json<ActivityRequest>,
) -> Result<StatusCode, ApiError> {
    state.lobby.activity(request.connection_id, request.hidden)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /disconnect
#[instrument(skip(state, request), fields(connection_id = %request.connection_id))]
async fn disconnect(
    State(state): State<AppState>,
    Json(request): Json<DisconnectRequest>,
) -> Result<Json<DisconnectResponse>, ApiError> {
    let disconnected = state.lobby.disconnect(request.connection_id).await?;
    Ok(Json(DisconnectResponse { disconnected }))
}

/// Returns the router for sessions.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/connect", post(connect))
        .route("/activity", post(activity))
        .route("/disconnect", post(disconnect))
}
