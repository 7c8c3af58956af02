//! Domain model shared across contexts.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Question difficulty, which also selects the point values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Easy question.
    Easy,
    /// Medium question.
    Medium,
    /// Hard question.
    Hard,
}

impl Difficulty {
    /// Cycles easy, medium, hard by position; used to label rooms.
    #[must_use]
    pub fn for_index(index: usize) -> Self {
        match index % 3 {
            0 => Self::Easy,
            1 => Self::Medium,
            _ => Self::Hard,
        }
    }
}

/// A question as the orchestrator holds it, reveal fields included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Question identifier in the content store.
    pub id: String,
    /// Question text.
    pub text: String,
    /// Answer options.
    pub options: Vec<String>,
    /// Index of the correct option.
    pub correct_index: usize,
    /// Content category.
    pub category: String,
    /// Difficulty.
    pub difficulty: Difficulty,
    /// Short explanation, revealed after the question ends.
    pub explanation: Option<String>,
    /// Long-form explanation, revealed after the question ends.
    pub detailed_explanation: Option<String>,
    /// Source citation, revealed after the question ends.
    pub citation: Option<String>,
}

/// The part of a question that may be sent to clients before reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    /// Question identifier.
    pub id: String,
    /// Question text.
    pub text: String,
    /// Answer options.
    pub options: Vec<String>,
    /// Content category.
    pub category: String,
    /// Difficulty.
    pub difficulty: Difficulty,
}

impl Question {
    /// Strips every reveal-only field.
    #[must_use]
    pub fn public_view(&self) -> QuestionView {
        QuestionView {
            id: self.id.clone(),
            text: self.text.clone(),
            options: self.options.clone(),
            category: self.category.clone(),
            difficulty: self.difficulty,
        }
    }

    /// Returns `true` if `answer_index` names the correct option.
    #[must_use]
    pub fn is_correct(&self, answer_index: usize) -> bool {
        answer_index == self.correct_index
    }
}

/// Lifecycle status of a room as shown in the lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Accepting joins; no set running.
    Waiting,
    /// A set is being played.
    InProgress,
    /// The set has ended.
    Completed,
}

/// Lifecycle status of a quiz set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetStatus {
    /// Created, start time in the future.
    Scheduled,
    /// Being played.
    Active,
    /// Finished.
    Completed,
}

/// A verified identity handed over by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedIdentity {
    /// Stable user identifier.
    pub user_id: String,
    /// Display name.
    pub display_name: String,
    /// Whether the account is on the free tier.
    #[serde(default)]
    pub free_tier: bool,
}

/// Lobby listing entry for one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomListItem {
    /// Room identifier.
    pub id: Uuid,
    /// Room display name.
    pub name: String,
    /// Room difficulty label.
    pub difficulty: Difficulty,
    /// Capacity.
    pub max_players: u32,
    /// Occupied slots, reserved slots included.
    pub current_players: u32,
    /// Room status.
    pub status: RoomStatus,
    /// Set the room is playing or waiting for.
    pub set_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_question() -> Question {
        Question {
            id: "q-1".to_owned(),
            text: "Which planet is closest to the sun?".to_owned(),
            options: vec!["Venus".to_owned(), "Mercury".to_owned()],
            correct_index: 1,
            category: "science".to_owned(),
            difficulty: Difficulty::Easy,
            explanation: Some("Mercury orbits at 0.39 AU.".to_owned()),
            detailed_explanation: Some("Long form.".to_owned()),
            citation: Some("NASA".to_owned()),
        }
    }

    #[test]
    fn test_public_view_serializes_without_reveal_fields() {
        // Arrange
        let question = sample_question();

        // Act
        let json = serde_json::to_value(question.public_view()).unwrap();

        // Assert
        let object = json.as_object().unwrap();
        assert!(!object.contains_key("correctIndex"));
        assert!(!object.contains_key("explanation"));
        assert!(!object.contains_key("detailedExplanation"));
        assert!(!object.contains_key("citation"));
        assert_eq!(object["text"], "Which planet is closest to the sun?");
    }

    #[test]
    fn test_difficulty_for_index_cycles() {
        assert_eq!(Difficulty::for_index(0), Difficulty::Easy);
        assert_eq!(Difficulty::for_index(4), Difficulty::Medium);
        assert_eq!(Difficulty::for_index(5), Difficulty::Hard);
    }
}
