//! Tagged wire events exchanged with the real-time transport.
//!
//! Every message is an adjacently tagged variant: `{"event": <name>,
//! "payload": {...}}`. Inbound messages are validated here, at the
//! boundary, before anything reaches a room.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OrchestratorError;
use crate::model::{QuestionView, RoomListItem};

/// Largest latency sample accepted from a client, in milliseconds.
pub const MAX_REPORTED_LATENCY_MS: f64 = 60_000.0;

/// Inbound `buzz` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuzzPayload {
    /// The buzzing player.
    pub player_id: String,
    /// Client-side press time, epoch milliseconds.
    pub timestamp: i64,
    /// Measured round-trip latency, milliseconds.
    pub latency: f64,
}

/// Inbound `answer` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPayload {
    /// The answering player.
    pub player_id: String,
    /// Chosen option.
    pub answer_index: usize,
    /// Client message id; redelivery of the same id is applied once.
    #[serde(default)]
    pub message_id: Option<Uuid>,
}

/// Inbound `ping` payload carrying a latency sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingPayload {
    /// The reporting player.
    pub player_id: String,
    /// Measured round-trip latency, milliseconds.
    pub latency: f64,
}

/// Inbound `visibility` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityPayload {
    /// Whether the client is now hidden/backgrounded.
    pub hidden: bool,
}

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum InboundEvent {
    /// A buzzer press.
    Buzz(BuzzPayload),
    /// An answer from the player holding the floor.
    Answer(AnswerPayload),
    /// A latency sample.
    Ping(PingPayload),
    /// A bare activity signal.
    Activity,
    /// A visibility change.
    Visibility(VisibilityPayload),
}

impl InboundEvent {
    /// Parses and validates a raw inbound message.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Malformed` if the message has an unknown
    /// event name, the wrong shape, or out-of-range values.
    pub fn from_json(value: serde_json::Value) -> Result<Self, OrchestratorError> {
        let event: Self = serde_json::from_value(value)
            .map_err(|e| OrchestratorError::Malformed(e.to_string()))?;
        event.validate()?;
        Ok(event)
    }

    /// Checks value ranges the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Malformed` on the first violated bound.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        match self {
            Self::Buzz(buzz) => {
                require_player(&buzz.player_id)?;
                require_latency(buzz.latency)?;
                if buzz.timestamp <= 0 {
                    return Err(OrchestratorError::Malformed(
                        "buzz timestamp must be positive".to_owned(),
                    ));
                }
                Ok(())
            }
            Self::Answer(answer) => require_player(&answer.player_id),
            Self::Ping(ping) => {
                require_player(&ping.player_id)?;
                require_latency(ping.latency)
            }
            Self::Activity | Self::Visibility(_) => Ok(()),
        }
    }

    /// The player a room-scoped event claims to come from.
    #[must_use]
    pub fn player_id(&self) -> Option<&str> {
        match self {
            Self::Buzz(buzz) => Some(&buzz.player_id),
            Self::Answer(answer) => Some(&answer.player_id),
            Self::Ping(ping) => Some(&ping.player_id),
            Self::Activity | Self::Visibility(_) => None,
        }
    }

    /// The wire name of this event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Buzz(_) => "buzz",
            Self::Answer(_) => "answer",
            Self::Ping(_) => "ping",
            Self::Activity => "activity",
            Self::Visibility(_) => "visibility",
        }
    }
}

fn require_player(player_id: &str) -> Result<(), OrchestratorError> {
    if player_id.trim().is_empty() {
        return Err(OrchestratorError::Malformed(
            "playerId must not be empty".to_owned(),
        ));
    }
    Ok(())
}

fn require_latency(latency: f64) -> Result<(), OrchestratorError> {
    if !latency.is_finite() || !(0.0..=MAX_REPORTED_LATENCY_MS).contains(&latency) {
        return Err(OrchestratorError::Malformed(format!(
            "latency {latency} out of range"
        )));
    }
    Ok(())
}

/// Lobby availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LobbyStatus {
    /// Rooms are listed and joinable.
    Open,
    /// No joinable room could be produced; rooms will appear shortly.
    Degraded,
    /// Maintenance mode is active.
    Maintenance,
}

/// Outbound `room_list` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomListPayload {
    /// Listed rooms.
    pub rooms: Vec<RoomListItem>,
    /// Lobby availability.
    pub status: LobbyStatus,
    /// Client-facing note for non-open states.
    pub message: Option<String>,
}

/// Outbound `question_start` payload. Carries no reveal fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionStartPayload {
    /// The question without answer or explanation.
    pub question: QuestionView,
    /// Zero-based position in the set.
    pub question_index: usize,
    /// Questions in the set.
    pub total_questions: usize,
    /// Open-buzzer window, milliseconds.
    pub question_duration: u64,
    /// Answer window, milliseconds.
    pub answer_timeout: u64,
}

/// Outbound `buzz` winner notice.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuzzWinnerPayload {
    /// The winning player.
    pub player_id: String,
    /// Winner display name.
    pub display_name: String,
    /// Latency-corrected press time, epoch milliseconds.
    pub adjusted_timestamp: f64,
}

/// Outbound processed `answer` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResultPayload {
    /// The answering player.
    pub player_id: String,
    /// Chosen option.
    pub answer_index: usize,
    /// Whether it was correct.
    pub is_correct: bool,
    /// The correct option.
    pub correct_index: usize,
    /// Points applied.
    pub points_awarded: i64,
}

/// A player's running score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    /// Player identifier.
    pub user_id: String,
    /// Display name.
    pub display_name: String,
    /// Score.
    pub score: i64,
    /// Correct answers this set.
    pub correct_count: u32,
    /// Wrong answers this set.
    pub wrong_count: u32,
}

/// One ranked leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// One-based rank.
    pub rank: u32,
    /// Player identifier.
    pub user_id: String,
    /// Display name.
    pub display_name: String,
    /// Score.
    pub score: i64,
    /// Key the tie-break policy ordered on, for display.
    pub tie_break_key: String,
}

/// A badge granted by one scoring event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarnedBadge {
    /// Receiving player.
    pub user_id: String,
    /// Badge identifier.
    pub badge_id: String,
    /// Badge display name.
    pub name: String,
    /// Bonus skill points.
    pub skill_points: u32,
}

/// Per-player badge tally for a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeSummaryEntry {
    /// Player identifier.
    pub user_id: String,
    /// Badge identifier.
    pub badge_id: String,
    /// Times granted during the set.
    pub count: u32,
    /// Skill points earned from this badge during the set.
    pub skill_points: u32,
}

/// Outbound `question_end` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionEndPayload {
    /// The correct option.
    pub correct_index: usize,
    /// Short explanation.
    pub explanation: Option<String>,
    /// Long-form explanation.
    pub detailed_explanation: Option<String>,
    /// Source citation.
    pub citation: Option<String>,
    /// Scores after this question.
    pub scores: Vec<ScoreEntry>,
    /// Ranked leaderboard after this question.
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Buzzer winner, if anyone buzzed.
    pub winner_id: Option<String>,
    /// Buzzer winner display name.
    pub winner_name: Option<String>,
    /// Whether the winner submitted an answer.
    pub was_answered: bool,
    /// Whether that answer was correct.
    pub was_correct: bool,
    /// Milliseconds until the next question starts; `None` on the last one.
    pub next_question_in: Option<u64>,
    /// Badges granted by this question.
    pub earned_badges: Vec<EarnedBadge>,
}

/// Outbound `set_end` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetEndPayload {
    /// Final scores.
    pub final_scores: Vec<ScoreEntry>,
    /// Final leaderboard.
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Badges granted during the set.
    pub badges_summary: Vec<BadgeSummaryEntry>,
}

/// Outbound `score_update` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreUpdatePayload {
    /// Current scores.
    pub scores: Vec<ScoreEntry>,
}

/// Outbound `duplicate_connection` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateConnectionPayload {
    /// The connection that must self-terminate.
    pub client_id: Uuid,
}

/// A player as announced to a room.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    /// Player identifier.
    pub id: String,
    /// Display name.
    pub display_name: String,
    /// Whether the player is a bot.
    pub is_ai: bool,
    /// Current score.
    pub score: i64,
    /// Rolling average latency, milliseconds.
    pub latency: f64,
}

/// Outbound `player_joined` payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerJoinedPayload {
    /// The player.
    pub player: PlayerSummary,
}

/// Outbound `player_left` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerLeftPayload {
    /// The player.
    pub player_id: String,
}

/// Client-visible result of a join attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JoinOutcome {
    /// The player now holds a slot.
    Success,
    /// The player reclaimed a slot held for them after a reserved leave.
    Rejoined,
    /// No free slot.
    Full,
    /// The join window is not open.
    WindowClosed,
    /// The room is playing a set.
    InProgress,
    /// A free-tier player used up today's sets.
    DailyLimitReached,
    /// Maintenance mode is active.
    Maintenance,
}

impl JoinOutcome {
    /// Whether the player ended up holding a slot.
    #[must_use]
    pub fn is_seated(self) -> bool {
        matches!(self, Self::Success | Self::Rejoined)
    }
}

/// Client-visible result of a queued join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "result")]
pub enum QueueOutcome {
    /// Queued at this one-based position.
    Queued {
        /// Position in the FIFO queue.
        position: usize,
    },
    /// Already holding a slot in the room.
    AlreadyJoined,
    /// The join window is already open; join directly.
    WindowOpen,
    /// Queueing is not possible now.
    WindowClosed,
    /// The room is playing a set.
    InProgress,
}

/// Outbound `join_result` payload, sent to a queued player's connection
/// when the queue is flushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResultPayload {
    /// The room.
    pub room_id: Uuid,
    /// The outcome.
    pub result: JoinOutcome,
}

/// Messages the orchestrator publishes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Lobby room listing.
    RoomList(RoomListPayload),
    /// A question opened.
    QuestionStart(QuestionStartPayload),
    /// The buzzer winner.
    Buzz(BuzzWinnerPayload),
    /// A processed answer.
    Answer(AnswerResultPayload),
    /// A question ended.
    QuestionEnd(QuestionEndPayload),
    /// A set ended.
    SetEnd(SetEndPayload),
    /// Scores changed.
    ScoreUpdate(ScoreUpdatePayload),
    /// The receiving connection was superseded.
    DuplicateConnection(DuplicateConnectionPayload),
    /// A player joined the room.
    PlayerJoined(PlayerJoinedPayload),
    /// A player left the room.
    PlayerLeft(PlayerLeftPayload),
    /// Outcome of a queued join.
    JoinResult(JoinResultPayload),
}

impl OutboundEvent {
    /// The wire name of this event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoomList(_) => "room_list",
            Self::QuestionStart(_) => "question_start",
            Self::Buzz(_) => "buzz",
            Self::Answer(_) => "answer",
            Self::QuestionEnd(_) => "question_end",
            Self::SetEnd(_) => "set_end",
            Self::ScoreUpdate(_) => "score_update",
            Self::DuplicateConnection(_) => "duplicate_connection",
            Self::PlayerJoined(_) => "player_joined",
            Self::PlayerLeft(_) => "player_left",
            Self::JoinResult(_) => "join_result",
        }
    }
}
