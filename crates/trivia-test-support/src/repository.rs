//! In-memory storage — one mock implementing every storage port.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use trivia_core::config::GameConfig;
use trivia_core::error::OrchestratorError;
use trivia_core::model::{Difficulty, Question};
use trivia_core::repository::{
    ConfigRepository, PlayerProgress, ProgressRepository, QuestionRepository, ScoreRecord,
    SetSummaryRecord,
};

/// Builds a question with option 0 correct.
#[must_use]
pub fn sample_question(id: &str, category: &str) -> Question {
    Question {
        id: id.to_owned(),
        text: format!("Question {id}?"),
        options: vec![
            "Right".to_owned(),
            "Wrong".to_owned(),
            "Also wrong".to_owned(),
            "Nope".to_owned(),
        ],
        correct_index: 0,
        category: category.to_owned(),
        difficulty: Difficulty::Easy,
        explanation: Some(format!("Because {id}.")),
        detailed_explanation: None,
        citation: None,
    }
}

/// Builds `count` sample questions `q-0 .. q-{count-1}`.
#[must_use]
pub fn sample_questions(count: usize, category: &str) -> Vec<Question> {
    (0..count)
        .map(|i| sample_question(&format!("q-{i}"), category))
        .collect()
}

#[derive(Debug, Default)]
struct State {
    config: Option<GameConfig>,
    config_failure: bool,
    unused: HashMap<String, Vec<Question>>,
    used: HashMap<String, Vec<Question>>,
    asked: Vec<String>,
    answered_correctly: Vec<String>,
    answered_incorrectly: Vec<String>,
    recycles: Vec<String>,
    scores: Vec<ScoreRecord>,
    badges: Vec<(String, String, u32)>,
    summaries: Vec<SetSummaryRecord>,
    progress: HashMap<String, PlayerProgress>,
    writes_fail: bool,
}

/// In-memory storage collaborator with switchable failures.
///
/// Questions move from the unused pool to the used pool when marked asked,
/// and back when recycled.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    state: Mutex<State>,
}

impl InMemoryStorage {
    /// Creates an empty store serving `GameConfig::default()`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with `questions` unused.
    #[must_use]
    pub fn with_questions(questions: Vec<Question>) -> Self {
        let store = Self::new();
        store.add_unused(questions);
        store
    }

    /// Adds questions to the unused pool.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_unused(&self, questions: Vec<Question>) {
        let mut state = self.state.lock().unwrap();
        for q in questions {
            state.unused.entry(q.category.clone()).or_default().push(q);
        }
    }

    /// Adds questions directly to the used pool.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_used(&self, questions: Vec<Question>) {
        let mut state = self.state.lock().unwrap();
        for q in questions {
            state.used.entry(q.category.clone()).or_default().push(q);
        }
    }

    /// Sets the configuration served by `load_game_config`.
    pub fn set_config(&self, config: GameConfig) {
        self.state.lock().unwrap().config = Some(config);
    }

    /// Makes `load_game_config` fail (or succeed again).
    pub fn set_config_failure(&self, failing: bool) {
        self.state.lock().unwrap().config_failure = failing;
    }

    /// Makes every progress write fail (or succeed again).
    pub fn set_writes_fail(&self, failing: bool) {
        self.state.lock().unwrap().writes_fail = failing;
    }

    /// Seeds account-level progress for a user.
    pub fn set_progress(&self, user_id: &str, progress: PlayerProgress) {
        self.state
            .lock()
            .unwrap()
            .progress
            .insert(user_id.to_owned(), progress);
    }

    /// Question ids marked asked, in order.
    pub fn asked(&self) -> Vec<String> {
        self.state.lock().unwrap().asked.clone()
    }

    /// Question ids answered correctly, in order.
    pub fn answered_correctly(&self) -> Vec<String> {
        self.state.lock().unwrap().answered_correctly.clone()
    }

    /// Question ids answered incorrectly, in order.
    pub fn answered_incorrectly(&self) -> Vec<String> {
        self.state.lock().unwrap().answered_incorrectly.clone()
    }

    /// Categories recycled, in order.
    pub fn recycles(&self) -> Vec<String> {
        self.state.lock().unwrap().recycles.clone()
    }

    /// Score records received.
    pub fn scores(&self) -> Vec<ScoreRecord> {
        self.state.lock().unwrap().scores.clone()
    }

    /// Badge grants received as `(user_id, badge_id, skill_points)`.
    pub fn badges(&self) -> Vec<(String, String, u32)> {
        self.state.lock().unwrap().badges.clone()
    }

    /// Set summaries received.
    pub fn summaries(&self) -> Vec<SetSummaryRecord> {
        self.state.lock().unwrap().summaries.clone()
    }

    fn write_guard(&self) -> Result<std::sync::MutexGuard<'_, State>, OrchestratorError> {
        let state = self.state.lock().unwrap();
        if state.writes_fail {
            return Err(OrchestratorError::Infrastructure(
                "connection refused".to_owned(),
            ));
        }
        Ok(state)
    }
}

#[async_trait]
impl ConfigRepository for InMemoryStorage {
    async fn load_game_config(&self) -> Result<GameConfig, OrchestratorError> {
        let state = self.state.lock().unwrap();
        if state.config_failure {
            return Err(OrchestratorError::ConfigUnavailable(
                "connection refused".to_owned(),
            ));
        }
        Ok(state.config.clone().unwrap_or_default())
    }
}

#[async_trait]
impl QuestionRepository for InMemoryStorage {
    async fn fetch_questions(
        &self,
        category: &str,
        count: usize,
        exclude_ids: &[String],
    ) -> Result<Vec<Question>, OrchestratorError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .unused
            .get(category)
            .map(|pool| {
                pool.iter()
                    .filter(|q| !exclude_ids.contains(&q.id))
                    .take(count)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn mark_question_asked(&self, question_id: &str) -> Result<(), OrchestratorError> {
        let mut state = self.state.lock().unwrap();
        state.asked.push(question_id.to_owned());
        let mut moved = Vec::new();
        for pool in state.unused.values_mut() {
            if let Some(pos) = pool.iter().position(|q| q.id == question_id) {
                moved.push(pool.remove(pos));
            }
        }
        for q in moved {
            state.used.entry(q.category.clone()).or_default().push(q);
        }
        Ok(())
    }

    async fn mark_question_answered_correctly(
        &self,
        question_id: &str,
    ) -> Result<(), OrchestratorError> {
        self.state
            .lock()
            .unwrap()
            .answered_correctly
            .push(question_id.to_owned());
        Ok(())
    }

    async fn mark_question_answered_incorrectly(
        &self,
        question_id: &str,
    ) -> Result<(), OrchestratorError> {
        self.state
            .lock()
            .unwrap()
            .answered_incorrectly
            .push(question_id.to_owned());
        Ok(())
    }

    async fn recycle_used_questions(&self, category: &str) -> Result<usize, OrchestratorError> {
        let mut state = self.state.lock().unwrap();
        state.recycles.push(category.to_owned());
        let used = state.used.remove(category).unwrap_or_default();
        let recycled = used.len();
        state
            .unused
            .entry(category.to_owned())
            .or_default()
            .extend(used);
        Ok(recycled)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryStorage {
    async fn record_score(&self, record: &ScoreRecord) -> Result<(), OrchestratorError> {
        self.write_guard()?.scores.push(record.clone());
        Ok(())
    }

    async fn record_badge(
        &self,
        user_id: &str,
        badge_id: &str,
        skill_points: u32,
    ) -> Result<(), OrchestratorError> {
        self.write_guard()?
            .badges
            .push((user_id.to_owned(), badge_id.to_owned(), skill_points));
        Ok(())
    }

    async fn record_set_summary(
        &self,
        summary: &SetSummaryRecord,
    ) -> Result<(), OrchestratorError> {
        self.write_guard()?.summaries.push(summary.clone());
        Ok(())
    }

    async fn load_player_progress(
        &self,
        user_id: &str,
    ) -> Result<PlayerProgress, OrchestratorError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .progress
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }
}
