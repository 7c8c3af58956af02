//! Shared application state.

use std::sync::Arc;

use trivia_lobby::application::lobby::Lobby;

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The orchestrator.
    pub lobby: Arc<Lobby>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(lobby: Arc<Lobby>) -> Self {
        Self { lobby }
    }
}
