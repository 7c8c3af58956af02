//! Integration tests walking a player from connect to an in-room event.

mod common;

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_connect_list_join_and_ping_round_trip() {
    let (state, publisher) = common::build_test_state(common::join_window()).await;
    let connection_id = Uuid::new_v4();

    // POST /api/v1/sessions/connect
    let (status, json) = common::post_json(
        common::build_test_app(&state),
        "/api/v1/sessions/connect",
        &json!({ "user_id": "u1", "display_name": "Ada", "connection_id": connection_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["connectionId"], connection_id.to_string());

    // GET /api/v1/lobby/rooms
    let (status, json) =
        common::get_json(common::build_test_app(&state), "/api/v1/lobby/rooms").await;
    assert_eq!(status, StatusCode::OK);
    let room_id = json["rooms"][0]["id"].as_str().unwrap().to_owned();
    assert_eq!(json["rooms"][0]["currentPlayers"], 0);

    // POST /api/v1/rooms/{room_id}/join
    let (status, json) = common::post_json(
        common::build_test_app(&state),
        &format!("/api/v1/rooms/{room_id}/join"),
        &json!({ "connection_id": connection_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"], "success");

    // POST /api/v1/rooms/{room_id}/events
    let (status, _) = common::post_json(
        common::build_test_app(&state),
        &format!("/api/v1/rooms/{room_id}/events"),
        &json!({
            "connection_id": connection_id,
            "event": {"event": "ping", "payload": {"playerId": "u1", "latency": 80.0}},
        }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    // GET /api/v1/rooms/{room_id}: verify the seat
    let (status, json) = common::get_json(
        common::build_test_app(&state),
        &format!("/api/v1/rooms/{room_id}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["listing"]["currentPlayers"], 1);
    assert_eq!(json["players"][0]["id"], "u1");
    assert!(
        publisher
            .published()
            .iter()
            .any(|(_, event)| event.name() == "player_joined")
    );
}

#[tokio::test]
async fn test_event_from_foreign_connection_is_rejected() {
    let (state, _) = common::build_test_state(common::join_window()).await;
    let owner = Uuid::new_v4();
    let intruder = Uuid::new_v4();
    for (user, connection_id) in [("u1", owner), ("u2", intruder)] {
        common::post_json(
            common::build_test_app(&state),
            "/api/v1/sessions/connect",
            &json!({ "user_id": user, "display_name": user, "connection_id": connection_id }),
        )
        .await;
    }
    let room_id = state.lobby.room_list().unwrap().rooms[0].id;
    common::post_json(
        common::build_test_app(&state),
        &format!("/api/v1/rooms/{room_id}/join"),
        &json!({ "connection_id": owner }),
    )
    .await;

    let (status, json) = common::post_json(
        common::build_test_app(&state),
        &format!("/api/v1/rooms/{room_id}/events"),
        &json!({
            "connection_id": intruder,
            "event": {"event": "ping", "payload": {"playerId": "u1", "latency": 10.0}},
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "malformed");
}
