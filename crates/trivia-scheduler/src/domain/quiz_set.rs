//! Quiz sets: the question content shared by every room in one window.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use trivia_core::model::{Question, SetStatus};
use uuid::Uuid;

use super::schedule::SetBoundary;

/// A scheduled set. Questions are shared read-only across rooms; each room
/// runs its own timing over them.
#[derive(Debug, Clone)]
pub struct QuizSet {
    /// Set identifier.
    pub id: Uuid,
    /// Start of the active window.
    pub start_time: DateTime<Utc>,
    /// End of the active window.
    pub end_time: DateTime<Utc>,
    /// Ordered questions.
    pub questions: Arc<Vec<Question>>,
    /// Lifecycle status.
    pub status: SetStatus,
}

impl QuizSet {
    /// Creates a scheduled set with no content yet.
    #[must_use]
    pub fn scheduled(boundary: &SetBoundary) -> Self {
        Self {
            id: Uuid::now_v7(),
            start_time: boundary.set_start,
            end_time: boundary.set_end,
            questions: Arc::new(Vec::new()),
            status: SetStatus::Scheduled,
        }
    }

    /// Attaches content and marks the set active.
    #[must_use]
    pub fn activate(mut self, questions: Vec<Question>) -> Self {
        self.questions = Arc::new(questions);
        self.status = SetStatus::Active;
        self
    }

    /// Number of questions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Whether the set has no questions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}
