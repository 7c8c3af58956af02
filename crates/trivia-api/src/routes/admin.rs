//! Administrative routes.
//!
//! Requests here carry no player identity. The router is mounted on its own
//! prefix so the front end can expose it to operators only; it must never be
//! reachable from player clients.

use axum::extract::{Path, State};
use axum::{Json, Router, routing::post};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::rooms::RemovedResponse;
use crate::state::AppState;

/// Request body for POST /rooms/{room_id}/kick.
#[derive(Debug, Deserialize)]
pub struct KickRequest {
    /// The player to remove.
    pub user_id: String,
}

/// POST /rooms/{room_id}/kick
#[instrument(skip(state, request), fields(user_id = %request.user_id))]
async fn kick(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(request): Json<KickRequest>,
) -> Result<Json<RemovedResponse>, ApiError> {
    let removed = state.lobby.kick(room_id, &request.user_id).await?;
    info!(removed, "kick handled");
    Ok(Json(RemovedResponse { removed }))
}

/// Returns the router for operator actions.
pub fn router() -> Router<AppState> {
    Router::new().route("/rooms/{room_id}/kick", post(kick))
}
