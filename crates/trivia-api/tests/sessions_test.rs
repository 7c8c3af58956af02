//! Integration tests for the session routes.

mod common;

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_connect_returns_connection_id() {
    // Arrange
    let (state, _) = common::build_test_state(common::join_window()).await;
    let connection_id = Uuid::new_v4();
    let body = json!({
        "user_id": "u1",
        "display_name": "Ada",
        "connection_id": connection_id,
    });

    // Act
    let (status, json) = common::post_json(
        common::build_test_app(&state),
        "/api/v1/sessions/connect",
        &body,
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["connectionId"], connection_id.to_string());
    assert!(json["superseded"].is_null());
}

#[tokio::test]
async fn test_second_connect_reports_superseded_connection() {
    // Arrange
    let (state, _) = common::build_test_state(common::join_window()).await;
    let first = Uuid::new_v4();
    common::post_json(
        common::build_test_app(&state),
        "/api/v1/sessions/connect",
        &json!({ "user_id": "u1", "display_name": "Ada", "connection_id": first }),
    )
    .await;

    // Act
    let (status, json) = common::post_json(
        common::build_test_app(&state),
        "/api/v1/sessions/connect",
        &json!({ "user_id": "u1", "display_name": "Ada" }),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["superseded"], first.to_string());
}

#[tokio::test]
async fn test_activity_from_superseded_connection_returns_409() {
    // Arrange
    let (state, _) = common::build_test_state(common::join_window()).await;
    let stale = common::connect(&state, "u1").await;
    common::connect(&state, "u1").await;

    // Act
    let (status, json) = common::post_json(
        common::build_test_app(&state),
        "/api/v1/sessions/activity",
        &json!({ "connection_id": stale, "hidden": true }),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "duplicate_session");
}

#[tokio::test]
async fn test_activity_for_unknown_connection_returns_400() {
    let (state, _) = common::build_test_state(common::join_window()).await;
    let body = json!({ "connection_id": Uuid::new_v4() });

    let (status, json) = common::post_json(
        common::build_test_app(&state),
        "/api/v1/sessions/activity",
        &body,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "malformed");
}

#[tokio::test]
async fn test_disconnect_unknown_connection_is_not_an_error() {
    let (state, _) = common::build_test_state(common::join_window()).await;
    let body = json!({ "connection_id": Uuid::new_v4() });

    let (status, json) = common::post_json(
        common::build_test_app(&state),
        "/api/v1/sessions/disconnect",
        &body,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["disconnected"], false);
}

#[tokio::test]
async fn test_connect_returns_422_for_missing_fields() {
    let (state, _) = common::build_test_state(common::join_window()).await;

    let (status, _) = common::post_json(
        common::build_test_app(&state),
        "/api/v1/sessions/connect",
        &json!({}),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
