//! Question sourcing with recycle-and-retry on exhaustion.

use std::sync::Arc;

use tracing::{info, warn};
use trivia_core::error::OrchestratorError;
use trivia_core::model::Question;
use trivia_core::repository::QuestionRepository;

/// Loads set content from the question repository.
pub struct QuestionSource {
    repo: Arc<dyn QuestionRepository>,
}

impl std::fmt::Debug for QuestionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuestionSource").finish_non_exhaustive()
    }
}

impl QuestionSource {
    /// Wraps a repository.
    #[must_use]
    pub fn new(repo: Arc<dyn QuestionRepository>) -> Self {
        Self { repo }
    }

    /// Loads up to `count` questions for a set.
    ///
    /// When the unused pool cannot fill the request, used questions of the
    /// category are recycled and the shortfall is fetched once more.
    /// Malformed questions (no options, or a correct index out of range) are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::QuestionSourceExhausted` if no question is
    /// available even after recycling, or any repository error.
    pub async fn load_set(
        &self,
        category: &str,
        count: usize,
        exclude_ids: &[String],
    ) -> Result<Vec<Question>, OrchestratorError> {
        let mut excluded = exclude_ids.to_vec();
        let mut questions = self.fetch(category, count, &mut excluded).await?;

        if questions.len() < count {
            let recycled = self.repo.recycle_used_questions(category).await?;
            warn!(
                category,
                found = questions.len(),
                wanted = count,
                recycled,
                "question pool short, recycled used questions"
            );
            excluded.extend(questions.iter().map(|q| q.id.clone()));
            let more = self
                .fetch(category, count - questions.len(), &mut excluded)
                .await?;
            questions.extend(more);
        }

        if questions.is_empty() {
            return Err(OrchestratorError::QuestionSourceExhausted {
                category: category.to_owned(),
            });
        }
        info!(category, count = questions.len(), "loaded set questions");
        Ok(questions)
    }

    /// Fetches and validates; malformed ids are appended to `excluded` so a
    /// retry does not fetch them again.
    async fn fetch(
        &self,
        category: &str,
        count: usize,
        excluded: &mut Vec<String>,
    ) -> Result<Vec<Question>, OrchestratorError> {
        let fetched = match self.repo.fetch_questions(category, count, excluded).await {
            Ok(fetched) => fetched,
            Err(OrchestratorError::QuestionSourceExhausted { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };
        let (valid, malformed): (Vec<Question>, Vec<Question>) = fetched
            .into_iter()
            .partition(|q| !q.options.is_empty() && q.correct_index < q.options.len());
        for q in malformed {
            warn!(question_id = %q.id, "skipping malformed question");
            excluded.push(q.id);
        }
        Ok(valid.into_iter().take(count).collect())
    }
}

#[cfg(test)]
mod tests {
    use trivia_test_support::{InMemoryStorage, sample_question, sample_questions};

    use super::*;

    #[tokio::test]
    async fn test_load_set_uses_unused_pool_without_recycling() {
        // Arrange
        let store = Arc::new(InMemoryStorage::with_questions(sample_questions(5, "general")));
        let source = QuestionSource::new(store.clone());

        // Act
        let questions = source.load_set("general", 3, &[]).await.unwrap();

        // Assert
        assert_eq!(questions.len(), 3);
        assert!(store.recycles().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_pool_is_recycled_and_retried() {
        // Arrange
        let store = Arc::new(InMemoryStorage::new());
        store.add_used(sample_questions(4, "general"));
        let source = QuestionSource::new(store.clone());

        // Act
        let questions = source.load_set("general", 3, &[]).await.unwrap();

        // Assert
        assert_eq!(questions.len(), 3);
        assert_eq!(store.recycles(), vec!["general".to_owned()]);
    }

    #[tokio::test]
    async fn test_short_pool_is_topped_up_from_recycled_questions() {
        let store = Arc::new(InMemoryStorage::with_questions(vec![sample_question(
            "fresh", "general",
        )]));
        store.add_used(sample_questions(3, "general"));
        let source = QuestionSource::new(store.clone());

        let questions = source.load_set("general", 3, &[]).await.unwrap();

        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0].id, "fresh");
    }

    #[tokio::test]
    async fn test_fully_exhausted_category_is_an_error() {
        let store = Arc::new(InMemoryStorage::new());
        let source = QuestionSource::new(store);

        let result = source.load_set("history", 3, &[]).await;

        assert_eq!(
            result.unwrap_err(),
            OrchestratorError::QuestionSourceExhausted {
                category: "history".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_questions_are_skipped() {
        let mut broken = sample_question("broken", "general");
        broken.correct_index = 9;
        let store = Arc::new(InMemoryStorage::with_questions(vec![
            broken,
            sample_question("ok", "general"),
        ]));
        let source = QuestionSource::new(store);

        let questions = source.load_set("general", 2, &[]).await.unwrap();

        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].id, "ok");
    }
}
