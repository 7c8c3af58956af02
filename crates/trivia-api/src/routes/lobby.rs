//! Routes for the lobby listing.

use axum::extract::State;
use axum::{Json, Router, routing::get};
use tracing::instrument;
use trivia_core::event::RoomListPayload;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /rooms
#[instrument(skip(state))]
async fn list_rooms(State(state): State<AppState>) -> Result<Json<RoomListPayload>, ApiError> {
    Ok(Json(state.lobby.room_list()?))
}

/// Returns the router for the lobby.
pub fn router() -> Router<AppState> {
    Router::new().route("/rooms", get(list_rooms))
}
