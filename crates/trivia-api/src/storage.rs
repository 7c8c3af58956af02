//! Process-local storage adapter.
//!
//! Stands in for the external storage collaborator when the server runs on
//! its own: game config and the question pool are seeded from JSON files and
//! progress lives in memory for the life of the process.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::info;
use trivia_core::config::GameConfig;
use trivia_core::error::OrchestratorError;
use trivia_core::model::Question;
use trivia_core::repository::{
    ConfigRepository, PlayerProgress, ProgressRepository, QuestionRepository, ScoreRecord,
    SetSummaryRecord,
};

use crate::error::AppError;

#[derive(Debug, Default)]
struct Pools {
    unused: Vec<Question>,
    used: Vec<Question>,
    progress: HashMap<String, PlayerProgress>,
}

/// Storage adapter holding everything in process memory.
#[derive(Debug, Default)]
pub struct LocalStorage {
    config: GameConfig,
    pools: Mutex<Pools>,
}

impl LocalStorage {
    /// Creates a store over `questions`.
    #[must_use]
    pub fn new(config: GameConfig, questions: Vec<Question>) -> Self {
        Self {
            config,
            pools: Mutex::new(Pools {
                unused: questions,
                ..Pools::default()
            }),
        }
    }

    /// Loads config and questions from optional JSON files. A missing config
    /// path yields the defaults; a missing question path an empty pool.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a file cannot be read or parsed.
    pub fn from_files(config: Option<&Path>, questions: Option<&Path>) -> Result<Self, AppError> {
        let config = match config {
            Some(path) => read_json(path)?,
            None => GameConfig::default(),
        };
        let questions: Vec<Question> = match questions {
            Some(path) => read_json(path)?,
            None => Vec::new(),
        };
        info!(questions = questions.len(), "local storage seeded");
        Ok(Self::new(config, questions))
    }

    fn pools(&self) -> Result<MutexGuard<'_, Pools>, OrchestratorError> {
        self.pools.lock().map_err(|e| {
            OrchestratorError::Infrastructure(format!("storage mutex poisoned: {e}"))
        })
    }

    fn progress_mut<'a>(pools: &'a mut Pools, user_id: &str) -> &'a mut PlayerProgress {
        pools.progress.entry(user_id.to_owned()).or_default()
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| AppError::Config(format!("cannot parse {}: {e}", path.display())))
}

#[async_trait]
impl ConfigRepository for LocalStorage {
    async fn load_game_config(&self) -> Result<GameConfig, OrchestratorError> {
        Ok(self.config.clone())
    }
}

#[async_trait]
impl QuestionRepository for LocalStorage {
    async fn fetch_questions(
        &self,
        category: &str,
        count: usize,
        exclude_ids: &[String],
    ) -> Result<Vec<Question>, OrchestratorError> {
        Ok(self
            .pools()?
            .unused
            .iter()
            .filter(|q| q.category == category && !exclude_ids.contains(&q.id))
            .take(count)
            .cloned()
            .collect())
    }

    async fn mark_question_asked(&self, question_id: &str) -> Result<(), OrchestratorError> {
        let mut pools = self.pools()?;
        if let Some(pos) = pools.unused.iter().position(|q| q.id == question_id) {
            let question = pools.unused.remove(pos);
            pools.used.push(question);
        }
        Ok(())
    }

    async fn mark_question_answered_correctly(
        &self,
        _question_id: &str,
    ) -> Result<(), OrchestratorError> {
        Ok(())
    }

    async fn mark_question_answered_incorrectly(
        &self,
        _question_id: &str,
    ) -> Result<(), OrchestratorError> {
        Ok(())
    }

    async fn recycle_used_questions(&self, category: &str) -> Result<usize, OrchestratorError> {
        let mut pools = self.pools()?;
        let (recycled, kept): (Vec<Question>, Vec<Question>) = std::mem::take(&mut pools.used)
            .into_iter()
            .partition(|q| q.category == category);
        pools.used = kept;
        let count = recycled.len();
        pools.unused.extend(recycled);
        Ok(count)
    }
}

#[async_trait]
impl ProgressRepository for LocalStorage {
    async fn record_score(&self, record: &ScoreRecord) -> Result<(), OrchestratorError> {
        if record.correct {
            let mut pools = self.pools()?;
            Self::progress_mut(&mut pools, &record.user_id).lifetime_correct += 1;
        }
        Ok(())
    }

    async fn record_badge(
        &self,
        user_id: &str,
        badge_id: &str,
        _skill_points: u32,
    ) -> Result<(), OrchestratorError> {
        let mut pools = self.pools()?;
        let progress = Self::progress_mut(&mut pools, user_id);
        if !progress.badges.iter().any(|b| b == badge_id) {
            progress.badges.push(badge_id.to_owned());
        }
        Ok(())
    }

    async fn record_set_summary(
        &self,
        summary: &SetSummaryRecord,
    ) -> Result<(), OrchestratorError> {
        info!(
            set_id = %summary.set_id,
            room_id = %summary.room_id,
            players = summary.final_scores.len(),
            "set summary recorded"
        );
        Ok(())
    }

    async fn load_player_progress(
        &self,
        user_id: &str,
    ) -> Result<PlayerProgress, OrchestratorError> {
        Ok(self.pools()?.progress.get(user_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use trivia_test_support::sample_questions;

    use super::*;

    #[tokio::test]
    async fn test_asked_questions_leave_pool_until_recycled() {
        // Arrange
        let store = LocalStorage::new(GameConfig::default(), sample_questions(3, "general"));

        // Act
        store.mark_question_asked("q-0").await.unwrap();
        let remaining = store.fetch_questions("general", 10, &[]).await.unwrap();
        let recycled = store.recycle_used_questions("general").await.unwrap();
        let refilled = store.fetch_questions("general", 10, &[]).await.unwrap();

        // Assert
        assert_eq!(remaining.len(), 2);
        assert_eq!(recycled, 1);
        assert_eq!(refilled.len(), 3);
    }

    #[tokio::test]
    async fn test_progress_accumulates_correct_answers_and_badges() {
        let store = LocalStorage::default();
        let record = ScoreRecord {
            event_id: uuid::Uuid::new_v4(),
            user_id: "u1".to_owned(),
            display_name: "U1".to_owned(),
            room_id: uuid::Uuid::new_v4(),
            set_id: uuid::Uuid::new_v4(),
            question_id: "q-0".to_owned(),
            points: 10,
            correct: true,
            occurred_at: chrono::Utc::now(),
        };

        store.record_score(&record).await.unwrap();
        store.record_badge("u1", "first_correct", 5).await.unwrap();
        store.record_badge("u1", "first_correct", 5).await.unwrap();
        let progress = store.load_player_progress("u1").await.unwrap();

        assert_eq!(progress.lifetime_correct, 1);
        assert_eq!(progress.badges, vec!["first_correct".to_owned()]);
    }

    #[test]
    fn test_missing_seed_file_is_a_config_error() {
        let result = LocalStorage::from_files(Some(Path::new("/nonexistent/config.json")), None);

        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
