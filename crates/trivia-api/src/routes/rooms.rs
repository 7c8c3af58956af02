//! Routes for room membership and in-room events.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use trivia_core::event::JoinResultPayload;
use trivia_lobby::application::lobby::QueueJoinResult;
use trivia_room::domain::machine::RoomSnapshot;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body naming the acting connection.
#[derive(Debug, Deserialize)]
pub struct ConnectionRequest {
    /// The acting connection.
    pub connection_id: Uuid,
}

/// Request body for POST /{room_id}/leave.
#[derive(Debug, Deserialize)]
pub struct LeaveRequest {
    /// The leaving connection.
    pub connection_id: Uuid,
    /// Hold the slot for a reconnect.
    #[serde(default)]
    pub reserve: bool,
}

/// Request body for POST /{room_id}/events.
#[derive(Debug, Deserialize)]
pub struct EventRequest {
    /// The sending connection.
    pub connection_id: Uuid,
    /// The raw tagged event, validated before it reaches the room.
    pub event: serde_json::Value,
}

/// Response body for membership removals.
#[derive(Debug, Serialize)]
pub struct RemovedResponse {
    /// Whether the player was in the room.
    pub removed: bool,
}

/// GET /{room_id}
#[instrument(skip(state))]
async fn snapshot(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<RoomSnapshot>, ApiError> {
    Ok(Json(state.lobby.room_snapshot(room_id).await?))
}

/// POST /{room_id}/join
#[instrument(skip(state, request), fields(connection_id = %request.connection_id))]
async fn join(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(request): Json<ConnectionRequest>,
) -> Result<Json<JoinResultPayload>, ApiError> {
    let result = state.lobby.join_room(request.connection_id, room_id).await?;
    Ok(Json(JoinResultPayload { room_id, result }))
}

/// POST /{room_id}/queue
#[instrument(skip(state, request), fields(connection_id = %request.connection_id))]
async fn queue(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(request): Json<ConnectionRequest>,
) -> Result<Json<QueueJoinResult>, ApiError> {
    Ok(Json(
        state.lobby.queue_join(request.connection_id, room_id).await?,
    ))
}

/// POST /{room_id}/leave
#[instrument(skip(state, request), fields(connection_id = %request.connection_id, reserve = request.reserve))]
async fn leave(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(request): Json<LeaveRequest>,
) -> Result<Json<RemovedResponse>, ApiError> {
    let removed = state
        .lobby
        .leave_room(request.connection_id, room_id, request.reserve)
        .await?;
    Ok(Json(RemovedResponse { removed }))
}

/// POST /{room_id}/events
#[instrument(skip(state, request), fields(connection_id = %request.connection_id))]
async fn submit_event(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(request): Json<EventRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .lobby
        .submit_event(request.connection_id, room_id, request.event)?;
    Ok(StatusCode::ACCEPTED)
}

/// Returns the router for rooms.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{room_id}", get(snapshot))
        .route("/{room_id}/join", post(join))
        .route("/{room_id}/queue", post(queue))
        .route("/{room_id}/leave", post(leave))
        .route("/{room_id}/events", post(submit_event))
}
