//! Trivia session orchestrator — HTTP surface.
//!
//! Exposes the lobby to a transport front end. Identity is verified upstream;
//! requests carry the already-verified user and connection ids.

pub mod error;
pub mod publisher;
pub mod routes;
pub mod state;
pub mod storage;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builds the full router over `state`.
pub fn app(state: state::AppState) -> Router {
    // TODO: Replace CorsLayer::permissive() with the front end's origin once it is deployed.
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/lobby", routes::lobby::router())
        .nest("/api/v1/sessions", routes::sessions::router())
        .nest("/api/v1/rooms", routes::rooms::router())
        .nest("/api/v1/admin", routes::admin::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
