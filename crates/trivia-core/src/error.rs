//! Orchestrator error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level error type shared by every orchestrator component.
///
/// Client-visible outcomes of joins and connects are reported through
/// explicit result enums; these variants back them and are what internal
/// components propagate with `?`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    /// A join was attempted on a room that has no free slot.
    #[error("room {room_id} is full")]
    CapacityExceeded {
        /// The room that was full.
        room_id: Uuid,
    },

    /// A join was attempted outside the join window.
    #[error("join window is closed")]
    WindowClosed,

    /// An event arrived in a state that does not accept it.
    #[error("invalid transition: {event} not accepted in {state}")]
    InvalidTransition {
        /// The state the room was in.
        state: &'static str,
        /// The event that was rejected.
        event: &'static str,
    },

    /// A second connection was opened for the same identity.
    #[error("duplicate session for user {user_id}")]
    DuplicateSession {
        /// The user holding two connections.
        user_id: String,
    },

    /// No unused questions remain for a category.
    #[error("question source exhausted for category {category}")]
    QuestionSourceExhausted {
        /// The exhausted category.
        category: String,
    },

    /// The storage collaborator could not supply configuration.
    #[error("config unavailable: {0}")]
    ConfigUnavailable(String),

    /// The requested room does not exist.
    #[error("room not found: {0}")]
    RoomNotFound(Uuid),

    /// An inbound message failed validation at the transport boundary.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// The service is in maintenance mode.
    #[error("maintenance mode is active")]
    Maintenance,

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}
