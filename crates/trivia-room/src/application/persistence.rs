//! Fire-and-forget writes to the storage collaborator.
//!
//! Writes run on their own tasks with bounded retries; a write that never
//! succeeds is logged and dropped. No room ever waits on storage.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use trivia_core::backoff::BackoffPolicy;
use trivia_core::error::OrchestratorError;
use trivia_core::repository::{PlayerProgress, ProgressRepository, QuestionRepository};
use trivia_core::rng::DeterministicRng;

use crate::domain::machine::PersistOp;

/// Executes [`PersistOp`]s against the storage ports.
pub struct PersistenceWriter {
    questions: Arc<dyn QuestionRepository>,
    progress: Arc<dyn ProgressRepository>,
    backoff: BackoffPolicy,
    rng: Mutex<Box<dyn DeterministicRng>>,
}

impl std::fmt::Debug for PersistenceWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceWriter")
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl PersistenceWriter {
    /// Creates a writer.
    #[must_use]
    pub fn new(
        questions: Arc<dyn QuestionRepository>,
        progress: Arc<dyn ProgressRepository>,
        backoff: BackoffPolicy,
        rng: Box<dyn DeterministicRng>,
    ) -> Self {
        Self {
            questions,
            progress,
            backoff,
            rng: Mutex::new(rng),
        }
    }

    /// Spawns `op` onto its own task.
    pub fn submit(self: &Arc<Self>, op: PersistOp) -> JoinHandle<bool> {
        let writer = Arc::clone(self);
        tokio::spawn(async move { writer.write(&op).await })
    }

    /// Writes `op`, retrying per the backoff policy. Returns whether the
    /// write eventually succeeded.
    pub async fn write(&self, op: &PersistOp) -> bool {
        let mut attempt = 0;
        loop {
            match self.write_once(op).await {
                Ok(()) => {
                    debug!(op = op_name(op), attempt, "storage write succeeded");
                    return true;
                }
                Err(e) if self.backoff.should_retry(attempt + 1) => {
                    let delay = self.next_delay(attempt);
                    warn!(op = op_name(op), attempt, ?delay, error = %e, "storage write failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(op = op_name(op), attempts = attempt + 1, error = %e, "storage write dropped");
                    return false;
                }
            }
        }
    }

    /// Loads account progress, falling back to empty progress on failure.
    pub async fn load_progress(&self, user_id: &str) -> PlayerProgress {
        match self.progress.load_player_progress(user_id).await {
            Ok(progress) => progress,
            Err(e) => {
                warn!(user_id, error = %e, "player progress unavailable");
                PlayerProgress::default()
            }
        }
    }

    fn next_delay(&self, attempt: u32) -> Duration {
        match self.rng.lock() {
            Ok(mut rng) => self.backoff.delay_for(attempt, rng.as_mut()),
            Err(_) => self.backoff.base,
        }
    }

    async fn write_once(&self, op: &PersistOp) -> Result<(), OrchestratorError> {
        match op {
            PersistOp::QuestionAsked(id) => self.questions.mark_question_asked(id).await,
            PersistOp::AnsweredCorrectly(id) => {
                self.questions.mark_question_answered_correctly(id).await
            }
            PersistOp::AnsweredIncorrectly(id) => {
                self.questions.mark_question_answered_incorrectly(id).await
            }
            PersistOp::Score(record) => self.progress.record_score(record).await,
            PersistOp::Badge {
                user_id,
                badge_id,
                skill_points,
            } => {
                self.progress
                    .record_badge(user_id, badge_id, *skill_points)
                    .await
            }
            PersistOp::SetSummary(summary) => self.progress.record_set_summary(summary).await,
        }
    }
}

fn op_name(op: &PersistOp) -> &'static str {
    match op {
        PersistOp::QuestionAsked(_) => "question_asked",
        PersistOp::AnsweredCorrectly(_) => "answered_correctly",
        PersistOp::AnsweredIncorrectly(_) => "answered_incorrectly",
        PersistOp::Score(_) => "score",
        PersistOp::Badge { .. } => "badge",
        PersistOp::SetSummary(_) => "set_summary",
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use trivia_core::repository::SetSummaryRecord;
    use trivia_test_support::{InMemoryStorage, MockRng};
    use uuid::Uuid;

    use super::*;

    fn writer(store: &Arc<InMemoryStorage>) -> Arc<PersistenceWriter> {
        Arc::new(PersistenceWriter::new(
            store.clone(),
            store.clone(),
            BackoffPolicy {
                base: Duration::from_millis(50),
                multiplier: 2.0,
                cap: Duration::from_secs(1),
                jitter: 0.0,
                max_attempts: 3,
            },
            Box::new(MockRng),
        ))
    }

    fn summary() -> PersistOp {
        PersistOp::SetSummary(SetSummaryRecord {
            set_id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            final_scores: Vec::new(),
            completed_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 20, 0).unwrap(),
        })
    }

    #[tokio::test]
    async fn test_submitted_write_reaches_storage() {
        // Arrange
        let store = Arc::new(InMemoryStorage::new());
        let writer = writer(&store);

        // Act
        let written = writer
            .submit(PersistOp::QuestionAsked("q-7".to_owned()))
            .await
            .unwrap();

        // Assert
        assert!(written);
        assert_eq!(store.asked(), vec!["q-7".to_owned()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_write_is_retried_then_dropped() {
        let store = Arc::new(InMemoryStorage::new());
        store.set_writes_fail(true);
        let writer = writer(&store);
        let started = tokio::time::Instant::now();

        let written = writer.write(&summary()).await;

        assert!(!written);
        assert_eq!(started.elapsed(), Duration::from_millis(150));
        assert!(store.summaries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_succeeds_once_storage_recovers() {
        // Arrange
        let store = Arc::new(InMemoryStorage::new());
        store.set_writes_fail(true);
        let writer = writer(&store);
        let handle = writer.submit(summary());

        // Act
        tokio::time::sleep(Duration::from_millis(60)).await;
        store.set_writes_fail(false);
        let written = handle.await.unwrap();

        // Assert
        assert!(written);
        assert_eq!(store.summaries().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_progress_defaults_to_empty() {
        let store = Arc::new(InMemoryStorage::new());
        let writer = writer(&store);

        let progress = writer.load_progress("nobody").await;

        assert_eq!(progress, PlayerProgress::default());
    }
}
