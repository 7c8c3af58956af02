//! Storage collaborator ports.
//!
//! Persistence technology is outside the orchestrator. These traits name
//! the calls it needs; every write is treated as fire-and-forget with
//! eventual consistency, never as part of a room's in-memory transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::error::OrchestratorError;
use crate::event::ScoreEntry;
use crate::model::Question;

/// One applied score delta, forwarded for daily/weekly/all-time aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// Idempotency key of the scoring event.
    pub event_id: Uuid,
    /// Player identifier.
    pub user_id: String,
    /// Player display name.
    pub display_name: String,
    /// Room the score was earned in.
    pub room_id: Uuid,
    /// Set the score was earned in.
    pub set_id: Uuid,
    /// Question answered.
    pub question_id: String,
    /// Points applied.
    pub points: i64,
    /// Whether the answer was correct.
    pub correct: bool,
    /// When the delta was applied.
    pub occurred_at: DateTime<Utc>,
}

/// Final standings of one room for one set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetSummaryRecord {
    /// The set.
    pub set_id: Uuid,
    /// The room.
    pub room_id: Uuid,
    /// Final scores.
    pub final_scores: Vec<ScoreEntry>,
    /// When the set ended.
    pub completed_at: DateTime<Utc>,
}

/// Source of game configuration.
#[async_trait]
pub trait ConfigRepository: Send + Sync {
    /// Loads the current game configuration.
    async fn load_game_config(&self) -> Result<GameConfig, OrchestratorError>;
}

/// Source of question content and its usage bookkeeping.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Fetches up to `count` unused questions of `category`, skipping
    /// `exclude_ids`. An empty result means the unused pool is exhausted.
    async fn fetch_questions(
        &self,
        category: &str,
        count: usize,
        exclude_ids: &[String],
    ) -> Result<Vec<Question>, OrchestratorError>;

    /// Marks a question as shown.
    async fn mark_question_asked(&self, question_id: &str) -> Result<(), OrchestratorError>;

    /// Records a correct answer to a question.
    async fn mark_question_answered_correctly(
        &self,
        question_id: &str,
    ) -> Result<(), OrchestratorError>;

    /// Records a wrong answer to a question.
    async fn mark_question_answered_incorrectly(
        &self,
        question_id: &str,
    ) -> Result<(), OrchestratorError>;

    /// Returns every used question of `category` to the unused pool.
    /// Returns the number of questions recycled.
    async fn recycle_used_questions(&self, category: &str) -> Result<usize, OrchestratorError>;
}

/// Sink for scores and achievements, plus the account-level badge lookup.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Persists one applied score delta.
    async fn record_score(&self, record: &ScoreRecord) -> Result<(), OrchestratorError>;

    /// Persists a badge grant.
    async fn record_badge(
        &self,
        user_id: &str,
        badge_id: &str,
        skill_points: u32,
    ) -> Result<(), OrchestratorError>;

    /// Persists a room's final standings for a set.
    async fn record_set_summary(&self, summary: &SetSummaryRecord)
    -> Result<(), OrchestratorError>;

    /// Loads the one-time badges an account already holds, and its lifetime
    /// correct-answer total.
    async fn load_player_progress(
        &self,
        user_id: &str,
    ) -> Result<PlayerProgress, OrchestratorError>;
}

/// Account-level progress loaded when a player enters a room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProgress {
    /// One-time badges already held.
    pub badges: Vec<String>,
    /// Lifetime correct answers before this session.
    pub lifetime_correct: u32,
}
