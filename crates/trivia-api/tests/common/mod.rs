//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, TimeZone, Utc};
use tower::ServiceExt;
use trivia_core::backoff::BackoffPolicy;
use trivia_core::config::GameConfig;
use trivia_core::model::VerifiedIdentity;
use trivia_lobby::application::lobby::{Lobby, LobbyDeps};
use trivia_test_support::{
    FixedClock, InMemoryStorage, MockRng, RecordingPublisher, sample_questions,
};

use uuid::Uuid;

use trivia_api::state::AppState;

/// Inside the join window of the 10:30 set.
pub fn join_window() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 29, 0).unwrap()
}

/// Before the join window of the 10:30 set opens.
pub fn before_window() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 25, 0).unwrap()
}

/// A bootstrapped lobby frozen at `at`, plus the publisher it reports to.
pub async fn build_test_state(at: DateTime<Utc>) -> (AppState, Arc<RecordingPublisher>) {
    build_test_state_with(at, GameConfig::default()).await
}

/// Like [`build_test_state`], with an explicit config.
pub async fn build_test_state_with(
    at: DateTime<Utc>,
    config: GameConfig,
) -> (AppState, Arc<RecordingPublisher>) {
    let store = Arc::new(InMemoryStorage::with_questions(sample_questions(
        5, "general",
    )));
    store.set_config(config.clone());
    let publisher = Arc::new(RecordingPublisher::new());
    let deps = LobbyDeps {
        clock: Arc::new(FixedClock(at)),
        publisher: publisher.clone(),
        configs: store.clone(),
        questions: store.clone(),
        progress: store,
        backoff: BackoffPolicy::default(),
        config_rng: Box::new(MockRng),
        write_rng: Box::new(MockRng),
    };
    let lobby = Arc::new(Lobby::new(deps, &config));
    lobby.bootstrap().await.unwrap();
    (AppState::new(lobby), publisher)
}

/// Connect `user` straight through the lobby and return its connection id.
pub async fn connect(state: &AppState, user: &str) -> Uuid {
    let connection_id = Uuid::new_v4();
    let identity = VerifiedIdentity {
        user_id: user.to_owned(),
        display_name: user.to_uppercase(),
        free_tier: false,
    };
    state.lobby.connect(&identity, connection_id).await.unwrap();
    connection_id
}

/// Id of the first listed room.
pub fn first_room(state: &AppState) -> Uuid {
    state.lobby.room_list().unwrap().rooms[0].id
}

/// Build the full app router with the same layering as `main.rs`.
pub fn build_test_app(state: &AppState) -> Router {
    trivia_api::app(state.clone())
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    read(app.oneshot(request).await.unwrap()).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    read(app.oneshot(request).await.unwrap()).await
}

async fn read(response: axum::response::Response) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };

    (status, json)
}
