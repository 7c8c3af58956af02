//! Integration tests for room membership and in-room events.

mod common;

use axum::http::StatusCode;
use serde_json::{Value, json};
use trivia_api::state::AppState;
use uuid::Uuid;

async fn post(state: &AppState, uri: &str, body: Value) -> (StatusCode, Value) {
    common::post_json(common::build_test_app(state), uri, &body).await
}

#[tokio::test]
async fn test_join_in_window_returns_success() {
    // Arrange
    let (state, _) = common::build_test_state(common::join_window()).await;
    let connection_id = common::connect(&state, "u1").await;
    let room_id = common::first_room(&state);

    // Act
    let (status, json) = post(
        &state,
        &format!("/api/v1/rooms/{room_id}/join"),
        json!({ "connection_id": connection_id }),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["roomId"], room_id.to_string());
    assert_eq!(json["result"], "success");
}

#[tokio::test]
async fn test_join_before_window_reports_window_closed() {
    let (state, _) = common::build_test_state(common::before_window()).await;
    let connection_id = common::connect(&state, "u1").await;
    let room_id = common::first_room(&state);

    let (status, json) = post(
        &state,
        &format!("/api/v1/rooms/{room_id}/join"),
        json!({ "connection_id": connection_id }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"], "windowClosed");
}

#[tokio::test]
async fn test_join_from_superseded_connection_returns_409() {
    // Arrange
    let (state, _) = common::build_test_state(common::join_window()).await;
    let stale = common::connect(&state, "u1").await;
    common::connect(&state, "u1").await;
    let room_id = common::first_room(&state);

    // Act
    let (status, json) = post(
        &state,
        &format!("/api/v1/rooms/{room_id}/join"),
        json!({ "connection_id": stale }),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "duplicate_session");
    assert!(
        state
            .lobby
            .room_snapshot(room_id)
            .await
            .unwrap()
            .players
            .is_empty()
    );
}

#[tokio::test]
async fn test_queue_before_window_returns_position() {
    let (state, _) = common::build_test_state(common::before_window()).await;
    let connection_id = common::connect(&state, "u1").await;
    let room_id = common::first_room(&state);

    let (status, json) = post(
        &state,
        &format!("/api/v1/rooms/{room_id}/queue"),
        json!({ "connection_id": connection_id }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["queue"]["result"], "queued");
    assert_eq!(json["queue"]["position"], 1);
}

#[tokio::test]
async fn test_join_unknown_room_returns_404() {
    let (state, _) = common::build_test_state(common::join_window()).await;
    let connection_id = common::connect(&state, "u1").await;

    let (status, json) = post(
        &state,
        &format!("/api/v1/rooms/{}/join", Uuid::new_v4()),
        json!({ "connection_id": connection_id }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "room_not_found");
}

#[tokio::test]
async fn test_leave_with_reserve_keeps_slot() {
    // Arrange
    let (state, _) = common::build_test_state(common::join_window()).await;
    let connection_id = common::connect(&state, "u1").await;
    let room_id = common::first_room(&state);
    post(
        &state,
        &format!("/api/v1/rooms/{room_id}/join"),
        json!({ "connection_id": connection_id }),
    )
    .await;

    // Act
    let (status, json) = post(
        &state,
        &format!("/api/v1/rooms/{room_id}/leave"),
        json!({ "connection_id": connection_id, "reserve": true }),
    )
    .await;
    let (_, snapshot) = common::get_json(
        common::build_test_app(&state),
        &format!("/api/v1/rooms/{room_id}"),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed"], true);
    assert_eq!(snapshot["reserved"], json!(["u1"]));
    assert_eq!(snapshot["listing"]["currentPlayers"], 1);
}

#[tokio::test]
async fn test_valid_event_is_accepted() {
    let (state, _) = common::build_test_state(common::join_window()).await;
    let connection_id = common::connect(&state, "u1").await;
    let room_id = common::first_room(&state);
    post(
        &state,
        &format!("/api/v1/rooms/{room_id}/join"),
        json!({ "connection_id": connection_id }),
    )
    .await;

    let (status, _) = post(
        &state,
        &format!("/api/v1/rooms/{room_id}/events"),
        json!({
            "connection_id": connection_id,
            "event": {"event": "ping", "payload": {"playerId": "u1", "latency": 40.0}},
        }),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_malformed_event_returns_400() {
    let (state, _) = common::build_test_state(common::join_window()).await;
    let connection_id = common::connect(&state, "u1").await;
    let room_id = common::first_room(&state);

    let (status, json) = post(
        &state,
        &format!("/api/v1/rooms/{room_id}/events"),
        json!({
            "connection_id": connection_id,
            "event": {"event": "buzz", "payload": {"playerId": "u1"}},
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "malformed");
}

#[tokio::test]
async fn test_kick_is_not_served_on_player_routes() {
    let (state, _) = common::build_test_state(common::join_window()).await;
    let room_id = common::first_room(&state);

    let (status, _) = post(
        &state,
        &format!("/api/v1/rooms/{room_id}/kick"),
        json!({ "user_id": "u1" }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
