//! Game configuration as supplied by the storage collaborator.
//!
//! Every option has a hard-coded default so the orchestrator can keep
//! running when the collaborator is unreachable and nothing is cached.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::model::Difficulty;

/// Points applied for a correct or wrong answer at one difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointValues {
    /// Points added for a correct answer.
    pub correct: i64,
    /// Points applied for a wrong answer (zero or negative).
    pub wrong: i64,
}

/// Point table keyed by question difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyPoints {
    /// Points for easy questions.
    pub easy: PointValues,
    /// Points for medium questions.
    pub medium: PointValues,
    /// Points for hard questions.
    pub hard: PointValues,
}

impl DifficultyPoints {
    /// Returns the point values for the given difficulty.
    #[must_use]
    pub fn for_difficulty(&self, difficulty: Difficulty) -> PointValues {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
        }
    }
}

impl Default for DifficultyPoints {
    fn default() -> Self {
        Self {
            easy: PointValues {
                correct: 10,
                wrong: -5,
            },
            medium: PointValues {
                correct: 20,
                wrong: -10,
            },
            hard: PointValues {
                correct: 30,
                wrong: -15,
            },
        }
    }
}

/// Deterministic ordering applied between players with equal scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// More correct answers first, then fewer wrong answers, then user id.
    #[default]
    CorrectCountThenUserId,
    /// Earlier room join first, then user id.
    EarliestJoinThenUserId,
    /// User id ordering only.
    UserId,
}

/// Recognized game options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(clippy::struct_excessive_bools)]
pub struct GameConfig {
    /// Hard cap on players per room.
    pub max_players_per_room: u32,
    /// One room is created per this many online players.
    pub players_per_room_threshold: u32,
    /// Pre-question countdown length.
    pub countdown_ms: u64,
    /// How long the buzzer stays open per question.
    pub question_duration_ms: u64,
    /// How long the buzzer winner has to answer.
    pub answer_timeout_ms: u64,
    /// Reveal window after each question.
    pub results_display_ms: u64,
    /// Buffering window opened by the first buzz of a question.
    pub buzzer_grace_ms: u64,
    /// Upper bound on the latency compensation applied to one buzz.
    pub max_latency_compensation_ms: u64,
    /// Questions per set.
    pub questions_per_set: usize,
    /// Length of one scheduling period.
    pub set_period_minutes: u32,
    /// Length of the active window at the start of each period.
    pub active_window_minutes: u32,
    /// How long before a set starts the join window opens.
    pub join_window_lead_seconds: u32,
    /// Inactivity after which a session is disconnected.
    pub idle_timeout_ms: u64,
    /// Hidden-client duration after which a session is disconnected.
    pub hidden_timeout_ms: u64,
    /// How long a reserved slot survives a `reserve=true` leave.
    pub reserve_grace_ms: u64,
    /// Sets a free-tier player may enter per UTC day.
    pub free_tier_daily_limit: u32,
    /// Scoring table.
    pub difficulty_points: DifficultyPoints,
    /// Leaderboard tie-break policy.
    pub tie_break: TieBreak,
    /// When set, no sets open and joins are refused.
    pub maintenance_mode: bool,
    /// Bound of each room's inbound event queue.
    pub room_queue_capacity: usize,
    /// Category questions are drawn from.
    pub default_category: String,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_players_per_room: 20,
            players_per_room_threshold: 15,
            countdown_ms: 3_000,
            question_duration_ms: 15_000,
            answer_timeout_ms: 10_000,
            results_display_ms: 5_000,
            buzzer_grace_ms: 150,
            max_latency_compensation_ms: 1_000,
            questions_per_set: 10,
            set_period_minutes: 30,
            active_window_minutes: 20,
            join_window_lead_seconds: 120,
            idle_timeout_ms: 300_000,
            hidden_timeout_ms: 120_000,
            reserve_grace_ms: 30_000,
            free_tier_daily_limit: 3,
            difficulty_points: DifficultyPoints::default(),
            tie_break: TieBreak::default(),
            maintenance_mode: false,
            room_queue_capacity: 256,
            default_category: "general".to_owned(),
        }
    }
}

/// Converts a millisecond setting into a `TimeDelta`, saturating on overflow.
#[must_use]
pub fn millis(ms: u64) -> TimeDelta {
    i64::try_from(ms)
        .ok()
        .and_then(TimeDelta::try_milliseconds)
        .unwrap_or(TimeDelta::MAX)
}

impl GameConfig {
    /// Pre-question countdown.
    #[must_use]
    pub fn countdown(&self) -> TimeDelta {
        millis(self.countdown_ms)
    }

    /// Open-buzzer window.
    #[must_use]
    pub fn question_duration(&self) -> TimeDelta {
        millis(self.question_duration_ms)
    }

    /// Answer window of the buzzer winner.
    #[must_use]
    pub fn answer_timeout(&self) -> TimeDelta {
        millis(self.answer_timeout_ms)
    }

    /// Reveal window.
    #[must_use]
    pub fn results_display(&self) -> TimeDelta {
        millis(self.results_display_ms)
    }

    /// Buzzer grace window.
    #[must_use]
    pub fn buzzer_grace(&self) -> TimeDelta {
        millis(self.buzzer_grace_ms)
    }

    /// Reserved-slot grace period.
    #[must_use]
    pub fn reserve_grace(&self) -> TimeDelta {
        millis(self.reserve_grace_ms)
    }

    /// Idle disconnect threshold.
    #[must_use]
    pub fn idle_timeout(&self) -> TimeDelta {
        millis(self.idle_timeout_ms)
    }

    /// Hidden-client disconnect threshold.
    #[must_use]
    pub fn hidden_timeout(&self) -> TimeDelta {
        millis(self.hidden_timeout_ms)
    }
}
