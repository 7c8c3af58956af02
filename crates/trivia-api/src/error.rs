//! Trivia orchestrator — API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use trivia_core::error::OrchestratorError;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable or seed file is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),

    /// The orchestrator failed to start.
    #[error("orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around `OrchestratorError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub OrchestratorError);

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            OrchestratorError::CapacityExceeded { .. } => (StatusCode::CONFLICT, "capacity_exceeded"),
            OrchestratorError::WindowClosed => (StatusCode::CONFLICT, "window_closed"),
            OrchestratorError::InvalidTransition { .. } => {
                (StatusCode::CONFLICT, "invalid_transition")
            }
            OrchestratorError::DuplicateSession { .. } => (StatusCode::CONFLICT, "duplicate_session"),
            OrchestratorError::QuestionSourceExhausted { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "question_source_exhausted")
            }
            OrchestratorError::ConfigUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "config_unavailable")
            }
            OrchestratorError::Maintenance => (StatusCode::SERVICE_UNAVAILABLE, "maintenance"),
            OrchestratorError::RoomNotFound(_) => (StatusCode::NOT_FOUND, "room_not_found"),
            OrchestratorError::Malformed(_) => (StatusCode::BAD_REQUEST, "malformed"),
            OrchestratorError::Infrastructure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "infrastructure_error")
            }
        };

        let body = ErrorBody {
            error: error_code,
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use uuid::Uuid;

    fn status_of(err: OrchestratorError) -> StatusCode {
        let response = ApiError(err).into_response();
        response.status()
    }

    #[test]
    fn test_room_not_found_maps_to_404() {
        assert_eq!(
            status_of(OrchestratorError::RoomNotFound(Uuid::new_v4())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_duplicate_session_maps_to_409() {
        assert_eq!(
            status_of(OrchestratorError::DuplicateSession {
                user_id: "u1".into(),
            }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_malformed_maps_to_400() {
        assert_eq!(
            status_of(OrchestratorError::Malformed("bad payload".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_exhausted_question_source_maps_to_503() {
        assert_eq!(
            status_of(OrchestratorError::QuestionSourceExhausted {
                category: "general".into(),
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_infrastructure_maps_to_500() {
        assert_eq!(
            status_of(OrchestratorError::Infrastructure("queue full".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
