//! The per-room game state machine.
//!
//! `waiting -> countdown -> open -> answering -> results -> (countdown | set_end)`,
//! with `open -> results` when nobody buzzes and any running phase reverting
//! to `waiting` when the room empties. The machine never touches a clock or
//! a socket: callers pass `now`, read [`RoomMachine::next_deadline`], and
//! drain the side effects it queues with [`RoomMachine::take_effects`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use trivia_core::config::GameConfig;
use trivia_core::error::OrchestratorError;
use trivia_core::event::{
    AnswerPayload, AnswerResultPayload, BuzzPayload, BuzzWinnerPayload, EarnedBadge,
    InboundEvent, JoinOutcome, JoinResultPayload, LeaderboardEntry, OutboundEvent,
    PlayerJoinedPayload, PlayerLeftPayload, PlayerSummary, QuestionEndPayload,
    QuestionStartPayload, QueueOutcome, ScoreUpdatePayload, SetEndPayload,
};
use trivia_core::model::{Difficulty, Question, RoomListItem, RoomStatus};
use trivia_core::publisher::Channel;
use trivia_core::repository::{PlayerProgress, ScoreRecord, SetSummaryRecord};
use trivia_scheduler::domain::join_queue::{JoinQueue, JoinRequest};
use trivia_scheduler::domain::quiz_set::QuizSet;
use trivia_scheduler::domain::schedule::SetBoundary;
use uuid::Uuid;

use super::badges::{AnswerContext, BadgeEvaluator};
use super::buzzer::{BuzzAccepted, BuzzEvent, BuzzerArbiter};
use super::player::{Player, Roster};
use super::scoring::{self, ScoreLedger, ScoreOutcome, ScoringEvent};

/// Static description of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    /// Room identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Difficulty label.
    pub difficulty: Difficulty,
    /// Capacity, fixed for the room's lifetime.
    pub max_players: u32,
}

/// Game-loop phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomPhase {
    /// No set running.
    Waiting,
    /// Counting down to the next question.
    Countdown,
    /// Buzzer open.
    Open,
    /// The buzzer winner holds the floor.
    Answering,
    /// Reveal between questions.
    Results,
    /// The set finished.
    SetEnd,
}

impl RoomPhase {
    /// Wire-style name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Countdown => "countdown",
            Self::Open => "open",
            Self::Answering => "answering",
            Self::Results => "results",
            Self::SetEnd => "set_end",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Stage {
    Waiting,
    Countdown {
        until: DateTime<Utc>,
    },
    Open {
        until: DateTime<Utc>,
    },
    Answering {
        holder: String,
        floor_at: DateTime<Utc>,
        until: DateTime<Utc>,
    },
    Results {
        until: DateTime<Utc>,
    },
    SetEnd,
}

impl Stage {
    fn phase(&self) -> RoomPhase {
        match self {
            Self::Waiting => RoomPhase::Waiting,
            Self::Countdown { .. } => RoomPhase::Countdown,
            Self::Open { .. } => RoomPhase::Open,
            Self::Answering { .. } => RoomPhase::Answering,
            Self::Results { .. } => RoomPhase::Results,
            Self::SetEnd => RoomPhase::SetEnd,
        }
    }
}

/// A write forwarded to the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOp {
    /// A question was shown.
    QuestionAsked(String),
    /// A question was answered correctly.
    AnsweredCorrectly(String),
    /// A question was answered incorrectly.
    AnsweredIncorrectly(String),
    /// A score delta was applied.
    Score(ScoreRecord),
    /// A badge was granted.
    Badge {
        /// Receiving player.
        user_id: String,
        /// Badge identifier.
        badge_id: String,
        /// Skill points granted.
        skill_points: u32,
    },
    /// A set finished in this room.
    SetSummary(SetSummaryRecord),
}

/// A side effect queued by the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Publish an event.
    Publish(Channel, OutboundEvent),
    /// Fire-and-forget storage write.
    Persist(PersistOp),
    /// Load account progress for a newly seated player.
    LoadProgress(String),
}

/// Outcome of flushing the join queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Seated, in FIFO order.
    pub admitted: Vec<String>,
    /// Turned away because the room was full.
    pub rejected: Vec<String>,
}

/// Point-in-time view of a room.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    /// Lobby listing.
    pub listing: RoomListItem,
    /// Game-loop phase.
    pub phase: RoomPhase,
    /// Zero-based index of the current question.
    pub question_index: usize,
    /// Seated players ordered by id.
    pub players: Vec<PlayerSummary>,
    /// Ids holding a reserved slot.
    pub reserved: Vec<String>,
    /// Players waiting in the join queue.
    pub queued: usize,
    /// Current leaderboard.
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// A room's complete game state. Owned by exactly one task.
#[derive(Debug)]
pub struct RoomMachine {
    info: RoomInfo,
    config: GameConfig,
    status: RoomStatus,
    set_id: Uuid,
    set: Option<QuizSet>,
    question_index: usize,
    stage: Stage,
    roster: Roster,
    queue: JoinQueue,
    queue_flushed: bool,
    arbiter: BuzzerArbiter,
    ledger: ScoreLedger,
    badges: BadgeEvaluator,
    question_badges: Vec<EarnedBadge>,
    answered_correctly: Option<bool>,
    outbox: Vec<Effect>,
}

impl RoomMachine {
    /// Creates an empty room waiting for `set_id`.
    #[must_use]
    pub fn new(info: RoomInfo, set_id: Uuid, config: GameConfig) -> Self {
        let arbiter = BuzzerArbiter::new(config.buzzer_grace(), config.max_latency_compensation_ms);
        Self {
            info,
            config,
            status: RoomStatus::Waiting,
            set_id,
            set: None,
            question_index: 0,
            stage: Stage::Waiting,
            roster: Roster::new(),
            queue: JoinQueue::new(),
            queue_flushed: false,
            arbiter,
            ledger: ScoreLedger::new(),
            badges: BadgeEvaluator::default(),
            question_badges: Vec::new(),
            answered_correctly: None,
            outbox: Vec::new(),
        }
    }

    /// Room identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.info.id
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> RoomPhase {
        self.stage.phase()
    }

    /// Current lobby status.
    #[must_use]
    pub fn status(&self) -> RoomStatus {
        self.status
    }

    /// Set the room is playing or waiting for.
    #[must_use]
    pub fn set_id(&self) -> Uuid {
        self.set_id
    }

    /// Zero-based index of the current question.
    #[must_use]
    pub fn question_index(&self) -> usize {
        self.question_index
    }

    /// The roster.
    #[must_use]
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Lobby listing entry.
    #[must_use]
    pub fn listing(&self) -> RoomListItem {
        RoomListItem {
            id: self.info.id,
            name: self.info.name.clone(),
            difficulty: self.info.difficulty,
            max_players: self.info.max_players,
            current_players: u32::try_from(self.roster.occupied()).unwrap_or(u32::MAX),
            status: self.status,
            set_id: self.set_id,
        }
    }

    /// Whether the room can be retired: nobody seated, reserved or queued,
    /// and no set running.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.roster.occupied() == 0 && self.queue.is_empty() && !self.is_running()
    }

    /// Point-in-time view for diagnostics and the HTTP surface.
    #[must_use]
    pub fn snapshot(&self) -> RoomSnapshot {
        let mut players: Vec<PlayerSummary> = self.roster.active().map(Player::summary).collect();
        players.sort_by(|a, b| a.id.cmp(&b.id));
        let mut reserved: Vec<String> = self
            .roster
            .everyone()
            .filter(|p| self.roster.is_reserved(&p.id))
            .map(|p| p.id.clone())
            .collect();
        reserved.sort();
        RoomSnapshot {
            listing: self.listing(),
            phase: self.phase(),
            question_index: self.question_index,
            players,
            reserved,
            queued: self.queue.len(),
            leaderboard: scoring::leaderboard(self.roster.everyone(), self.config.tie_break),
        }
    }

    /// The earliest instant at which [`RoomMachine::on_timer`] has work.
    #[must_use]
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        let stage = match &self.stage {
            Stage::Open { until } => self.arbiter.grace_deadline().or(Some(*until)),
            Stage::Countdown { until }
            | Stage::Answering { until, .. }
            | Stage::Results { until } => Some(*until),
            Stage::Waiting | Stage::SetEnd => None,
        };
        [stage, self.roster.next_expiry()].into_iter().flatten().min()
    }

    /// Drains queued side effects in the order they were produced.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.outbox)
    }

    fn publish(&mut self, event: OutboundEvent) {
        self.outbox
            .push(Effect::Publish(Channel::Room(self.info.id), event));
    }

    fn persist(&mut self, op: PersistOp) {
        self.outbox.push(Effect::Persist(op));
    }

    fn invalid(&self, event: &'static str) -> OrchestratorError {
        OrchestratorError::InvalidTransition {
            state: self.phase().as_str(),
            event,
        }
    }

    fn is_running(&self) -> bool {
        matches!(
            self.stage,
            Stage::Countdown { .. }
                | Stage::Open { .. }
                | Stage::Answering { .. }
                | Stage::Results { .. }
        )
    }

    fn has_free_slot(&self) -> bool {
        self.roster.occupied() < self.info.max_players as usize
    }

    fn seat(&mut self, request: &JoinRequest, now: DateTime<Utc>) {
        let player = Player::new(request, now);
        let summary = player.summary();
        self.roster.insert(player);
        self.publish(OutboundEvent::PlayerJoined(PlayerJoinedPayload {
            player: summary,
        }));
        self.outbox
            .push(Effect::LoadProgress(request.user_id.clone()));
    }

    /// Direct join. Flushes the pre-window queue first if the join window
    /// has opened and it has not been flushed for this set.
    pub fn join(
        &mut self,
        request: &JoinRequest,
        boundary: &SetBoundary,
        now: DateTime<Utc>,
    ) -> JoinOutcome {
        if let Some(player) = self.roster.get_mut(&request.user_id) {
            if request.connection_id.is_some() {
                player.connection_id = request.connection_id;
            }
            return JoinOutcome::Success;
        }
        if let Some(player) = self.roster.reclaim(&request.user_id, request.connection_id) {
            let summary = player.summary();
            info!(room_id = %self.info.id, user_id = %request.user_id, "reserved slot reclaimed");
            self.publish(OutboundEvent::PlayerJoined(PlayerJoinedPayload {
                player: summary,
            }));
            return JoinOutcome::Rejoined;
        }
        if boundary.join_window_open() && self.status == RoomStatus::Waiting {
            self.flush_queue(now);
            if self.roster.is_active(&request.user_id) {
                return JoinOutcome::Success;
            }
        }
        if self.status == RoomStatus::InProgress {
            return JoinOutcome::InProgress;
        }
        if self.status != RoomStatus::Waiting || !boundary.join_window_open() {
            return JoinOutcome::WindowClosed;
        }
        if !self.has_free_slot() {
            return JoinOutcome::Full;
        }
        self.seat(request, now);
        JoinOutcome::Success
    }

    /// Queues a join ahead of the join window.
    pub fn queue_join(
        &mut self,
        request: JoinRequest,
        boundary: &SetBoundary,
        now: DateTime<Utc>,
    ) -> QueueOutcome {
        if self.roster.is_active(&request.user_id) || self.roster.is_reserved(&request.user_id) {
            return QueueOutcome::AlreadyJoined;
        }
        if self.status == RoomStatus::InProgress {
            return QueueOutcome::InProgress;
        }
        if boundary.join_window_open() {
            return QueueOutcome::WindowOpen;
        }
        if !boundary.queueing_allowed() || self.status != RoomStatus::Waiting {
            return QueueOutcome::WindowClosed;
        }
        let position = self.queue.enqueue(request, now);
        QueueOutcome::Queued { position }
    }

    /// Seats queued players in FIFO order while slots remain. Runs at most
    /// once per set; later calls return an empty report.
    pub fn flush_queue(&mut self, now: DateTime<Utc>) -> FlushReport {
        let mut report = FlushReport::default();
        if self.queue_flushed {
            return report;
        }
        self.queue_flushed = true;
        for entry in self.queue.drain() {
            let request = entry.request;
            let result = if self.roster.is_active(&request.user_id) {
                JoinOutcome::Success
            } else if self.has_free_slot() {
                self.seat(&request, now);
                JoinOutcome::Success
            } else {
                JoinOutcome::Full
            };
            if let Some(connection_id) = request.connection_id {
                self.outbox.push(Effect::Publish(
                    Channel::Connection(connection_id),
                    OutboundEvent::JoinResult(JoinResultPayload {
                        room_id: self.info.id,
                        result,
                    }),
                ));
            }
            if result == JoinOutcome::Success {
                report.admitted.push(request.user_id);
            } else {
                report.rejected.push(request.user_id);
            }
        }
        if !report.admitted.is_empty() || !report.rejected.is_empty() {
            info!(
                room_id = %self.info.id,
                admitted = report.admitted.len(),
                rejected = report.rejected.len(),
                "join queue flushed"
            );
        }
        report
    }

    /// Removes a player. With `reserve`, the slot is held for the reserve
    /// grace period and the player can reclaim it. Returns `false` if the
    /// player was neither seated, reserved nor queued.
    pub fn leave(&mut self, user_id: &str, reserve: bool, now: DateTime<Utc>) -> bool {
        let was_queued = self.queue.remove(user_id);
        let Some(player) = self.roster.remove(user_id) else {
            if !reserve && self.roster.release(user_id).is_some() {
                self.publish(OutboundEvent::PlayerLeft(PlayerLeftPayload {
                    player_id: user_id.to_owned(),
                }));
                return true;
            }
            return was_queued;
        };
        if self.arbiter.withdraw(user_id) {
            debug!(room_id = %self.info.id, user_id, "buffered buzz withdrawn");
        }
        let held_floor =
            matches!(&self.stage, Stage::Answering { holder, .. } if holder == user_id);
        if reserve {
            self.roster
                .reserve(player, now + self.config.reserve_grace());
        } else {
            self.publish(OutboundEvent::PlayerLeft(PlayerLeftPayload {
                player_id: user_id.to_owned(),
            }));
        }
        debug!(room_id = %self.info.id, user_id, reserve, "player left");
        if self.roster.active_len() == 0 && self.is_running() {
            self.revert_to_waiting();
        } else if held_floor {
            self.finish_question(now);
        }
        true
    }

    fn revert_to_waiting(&mut self) {
        warn!(
            room_id = %self.info.id,
            phase = self.phase().as_str(),
            "room emptied mid-set, reverting to waiting"
        );
        self.stage = Stage::Waiting;
        self.status = RoomStatus::Waiting;
        self.set = None;
        self.arbiter.reset();
        self.question_badges.clear();
        self.answered_correctly = None;
    }

    /// Applies a validated client event.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::InvalidTransition` when the event does not
    /// apply in the current phase or is rejected by the arbiter, and
    /// `OrchestratorError::Malformed` when it names a player or option the
    /// room does not know.
    pub fn handle_inbound(
        &mut self,
        event: &InboundEvent,
        now: DateTime<Utc>,
    ) -> Result<(), OrchestratorError> {
        match event {
            InboundEvent::Ping(ping) => {
                if let Some(player) = self.roster.get_mut(&ping.player_id) {
                    player.record_latency(ping.latency);
                }
                Ok(())
            }
            InboundEvent::Buzz(buzz) => self.buzz(buzz, now),
            InboundEvent::Answer(answer) => self.answer(answer, now),
            InboundEvent::Activity | InboundEvent::Visibility(_) => Err(self.invalid(event.name())),
        }
    }

    fn buzz(&mut self, buzz: &BuzzPayload, now: DateTime<Utc>) -> Result<(), OrchestratorError> {
        let Stage::Open { until } = self.stage else {
            return Err(self.invalid("buzz"));
        };
        if now >= until && !self.arbiter.is_collecting() {
            return Err(self.invalid("buzz"));
        }
        let Some(player) = self.roster.get_mut(&buzz.player_id) else {
            return Err(OrchestratorError::Malformed(format!(
                "player {} is not seated in room {}",
                buzz.player_id, self.info.id
            )));
        };
        player.record_latency(buzz.latency);
        let event = BuzzEvent {
            player_id: buzz.player_id.clone(),
            raw_timestamp: buzz.timestamp,
            measured_latency: buzz.latency,
            received_at: now,
        };
        match self.arbiter.submit(&event) {
            Ok(BuzzAccepted::OpenedWindow(closes_at)) => {
                debug!(room_id = %self.info.id, player_id = %buzz.player_id, %closes_at, "buzzer grace window opened");
                Ok(())
            }
            Ok(BuzzAccepted::Buffered) => Ok(()),
            Err(rejection) => {
                debug!(room_id = %self.info.id, player_id = %buzz.player_id, reason = rejection.as_str(), "buzz rejected");
                Err(self.invalid("buzz"))
            }
        }
    }

    fn current_question(&self) -> Option<Question> {
        self.set
            .as_ref()
            .and_then(|set| set.questions.get(self.question_index).cloned())
    }

    fn answer(&mut self, answer: &AnswerPayload, now: DateTime<Utc>) -> Result<(), OrchestratorError> {
        let Stage::Answering {
            holder, floor_at, ..
        } = &self.stage
        else {
            return Err(self.invalid("answer"));
        };
        if *holder != answer.player_id {
            return Err(self.invalid("answer"));
        }
        let floor_at = *floor_at;
        let question = self.current_question().ok_or_else(|| {
            OrchestratorError::Infrastructure(format!("room {} has no current question", self.info.id))
        })?;
        if answer.answer_index >= question.options.len() {
            return Err(OrchestratorError::Malformed(format!(
                "answer index {} out of range",
                answer.answer_index
            )));
        }

        let correct = question.is_correct(answer.answer_index);
        let points =
            scoring::points_for(&self.config.difficulty_points, question.difficulty, correct);
        let scoring_event = ScoringEvent {
            event_id: answer.message_id.unwrap_or_else(Uuid::new_v4),
            player_id: answer.player_id.clone(),
            points,
            correct,
        };
        match self.ledger.apply(&mut self.roster, &scoring_event) {
            ScoreOutcome::Applied(_) => {}
            ScoreOutcome::Duplicate => return Ok(()),
            ScoreOutcome::UnknownPlayer => {
                return Err(OrchestratorError::Malformed(format!(
                    "player {} is not seated",
                    answer.player_id
                )));
            }
        }

        let context = AnswerContext {
            correct,
            answer_elapsed: now - floor_at,
        };
        let (earned, display_name) = match self.roster.get_mut(&answer.player_id) {
            Some(player) => (
                self.badges.evaluate(player, &context),
                player.display_name.clone(),
            ),
            None => (Vec::new(), answer.player_id.clone()),
        };

        self.publish(OutboundEvent::Answer(AnswerResultPayload {
            player_id: answer.player_id.clone(),
            answer_index: answer.answer_index,
            is_correct: correct,
            correct_index: question.correct_index,
            points_awarded: points,
        }));
        let scores = scoring::ranked_scores(self.roster.everyone(), self.config.tie_break);
        self.publish(OutboundEvent::ScoreUpdate(ScoreUpdatePayload { scores }));

        self.persist(if correct {
            PersistOp::AnsweredCorrectly(question.id.clone())
        } else {
            PersistOp::AnsweredIncorrectly(question.id.clone())
        });
        self.persist(PersistOp::Score(ScoreRecord {
            event_id: scoring_event.event_id,
            user_id: answer.player_id.clone(),
            display_name,
            room_id: self.info.id,
            set_id: self.set_id,
            question_id: question.id.clone(),
            points,
            correct,
            occurred_at: now,
        }));
        for badge in &earned {
            self.persist(PersistOp::Badge {
                user_id: badge.user_id.clone(),
                badge_id: badge.badge_id.clone(),
                skill_points: badge.skill_points,
            });
        }
        self.question_badges.extend(earned);
        self.answered_correctly = Some(correct);
        self.finish_question(now);
        Ok(())
    }

    /// Starts `set` if the room has players. Returns whether it started.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::InvalidTransition` unless the room is
    /// waiting, and `OrchestratorError::QuestionSourceExhausted` if the set
    /// has no questions.
    pub fn start_set(&mut self, set: QuizSet, now: DateTime<Utc>) -> Result<bool, OrchestratorError> {
        if self.stage != Stage::Waiting {
            return Err(self.invalid("start_set"));
        }
        if set.is_empty() {
            return Err(OrchestratorError::QuestionSourceExhausted {
                category: self.config.default_category.clone(),
            });
        }
        self.flush_queue(now);
        if self.roster.active_len() == 0 {
            debug!(room_id = %self.info.id, set_id = %set.id, "no players, set skipped");
            return Ok(false);
        }
        info!(
            room_id = %self.info.id,
            set_id = %set.id,
            players = self.roster.active_len(),
            questions = set.len(),
            "set started"
        );
        self.set_id = set.id;
        self.set = Some(set);
        self.question_index = 0;
        self.status = RoomStatus::InProgress;
        self.stage = Stage::Countdown {
            until: now + self.config.countdown(),
        };
        Ok(true)
    }

    /// Resets the room for the next set, keeping seated players and
    /// picking up a refreshed configuration.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::InvalidTransition` while a set is running.
    pub fn prepare_set(&mut self, set_id: Uuid, config: GameConfig) -> Result<(), OrchestratorError> {
        if self.is_running() {
            return Err(self.invalid("prepare_set"));
        }
        self.arbiter = BuzzerArbiter::new(config.buzzer_grace(), config.max_latency_compensation_ms);
        self.config = config;
        self.set_id = set_id;
        self.set = None;
        self.question_index = 0;
        self.status = RoomStatus::Waiting;
        self.stage = Stage::Waiting;
        self.queue_flushed = false;
        self.roster.reset_for_set();
        self.ledger.reset();
        self.badges.reset();
        self.question_badges.clear();
        self.answered_correctly = None;
        Ok(())
    }

    /// Merges account progress loaded for `user_id`.
    pub fn progress_loaded(&mut self, user_id: &str, progress: &PlayerProgress) {
        if let Some(player) = self.roster.any_mut(user_id) {
            player.merge_progress(progress);
        }
    }

    /// Runs every transition due at `now`.
    pub fn on_timer(&mut self, now: DateTime<Utc>) {
        for player in self.roster.expire_reservations(now) {
            info!(room_id = %self.info.id, user_id = %player.id, "reserved slot expired");
            self.publish(OutboundEvent::PlayerLeft(PlayerLeftPayload {
                player_id: player.id,
            }));
        }

        match &self.stage {
            Stage::Countdown { until } if now >= *until => self.open_question(now),
            Stage::Open { until } => {
                let until = *until;
                if self.arbiter.is_collecting() {
                    if let Some(winner) = self.arbiter.resolve_due(now) {
                        self.grant_floor(&winner.player_id, winner.adjusted_timestamp, now);
                    }
                } else if now >= until {
                    debug!(room_id = %self.info.id, "no buzz before question closed");
                    self.finish_question(now);
                }
            }
            Stage::Answering { holder, until, .. } if now >= *until => {
                let holder = holder.clone();
                if let Some(player) = self.roster.get_mut(&holder) {
                    player.streak = 0;
                }
                debug!(room_id = %self.info.id, %holder, "answer window expired");
                self.finish_question(now);
            }
            Stage::Results { until } if now >= *until => self.advance(now),
            _ => {}
        }
    }

    fn open_question(&mut self, now: DateTime<Utc>) {
        let Some(question) = self.current_question() else {
            self.end_set(now);
            return;
        };
        let total_questions = self.set.as_ref().map_or(0, QuizSet::len);
        self.arbiter.reset();
        self.publish(OutboundEvent::QuestionStart(QuestionStartPayload {
            question: question.public_view(),
            question_index: self.question_index,
            total_questions,
            question_duration: self.config.question_duration_ms,
            answer_timeout: self.config.answer_timeout_ms,
        }));
        self.persist(PersistOp::QuestionAsked(question.id));
        self.stage = Stage::Open {
            until: now + self.config.question_duration(),
        };
    }

    fn grant_floor(&mut self, player_id: &str, adjusted_timestamp: f64, now: DateTime<Utc>) {
        let Some(player) = self.roster.get(player_id) else {
            debug!(room_id = %self.info.id, player_id, "buzz winner left before taking the floor");
            self.finish_question(now);
            return;
        };
        let display_name = player.display_name.clone();
        self.publish(OutboundEvent::Buzz(BuzzWinnerPayload {
            player_id: player_id.to_owned(),
            display_name,
            adjusted_timestamp,
        }));
        self.stage = Stage::Answering {
            holder: player_id.to_owned(),
            floor_at: now,
            until: now + self.config.answer_timeout(),
        };
    }

    fn finish_question(&mut self, now: DateTime<Utc>) {
        let Some(question) = self.current_question() else {
            return;
        };
        let total_questions = self.set.as_ref().map_or(0, QuizSet::len);
        let is_last = self.question_index + 1 >= total_questions;
        let winner = self.arbiter.winner().map(|w| w.player_id.clone());
        let winner_name = winner.as_deref().and_then(|id| {
            self.roster
                .everyone()
                .find(|p| p.id == id)
                .map(|p| p.display_name.clone())
        });
        let tie_break = self.config.tie_break;
        let payload = QuestionEndPayload {
            correct_index: question.correct_index,
            explanation: question.explanation,
            detailed_explanation: question.detailed_explanation,
            citation: question.citation,
            scores: scoring::ranked_scores(self.roster.everyone(), tie_break),
            leaderboard: scoring::leaderboard(self.roster.everyone(), tie_break),
            winner_id: winner,
            winner_name,
            was_answered: self.answered_correctly.is_some(),
            was_correct: self.answered_correctly == Some(true),
            next_question_in: (!is_last)
                .then_some(self.config.results_display_ms + self.config.countdown_ms),
            earned_badges: std::mem::take(&mut self.question_badges),
        };
        self.publish(OutboundEvent::QuestionEnd(payload));
        self.arbiter.reset();
        self.answered_correctly = None;
        self.stage = Stage::Results {
            until: now + self.config.results_display(),
        };
    }

    fn advance(&mut self, now: DateTime<Utc>) {
        let total_questions = self.set.as_ref().map_or(0, QuizSet::len);
        if self.question_index + 1 < total_questions {
            self.question_index += 1;
            self.stage = Stage::Countdown {
                until: now + self.config.countdown(),
            };
        } else {
            self.end_set(now);
        }
    }

    fn end_set(&mut self, now: DateTime<Utc>) {
        let tie_break = self.config.tie_break;
        let final_scores = scoring::ranked_scores(self.roster.everyone(), tie_break);
        self.publish(OutboundEvent::SetEnd(SetEndPayload {
            final_scores: final_scores.clone(),
            leaderboard: scoring::leaderboard(self.roster.everyone(), tie_break),
            badges_summary: self.badges.summary(),
        }));
        self.persist(PersistOp::SetSummary(SetSummaryRecord {
            set_id: self.set_id,
            room_id: self.info.id,
            final_scores,
            completed_at: now,
        }));
        info!(room_id = %self.info.id, set_id = %self.set_id, "set ended");
        self.set = None;
        self.status = RoomStatus::Completed;
        self.stage = Stage::SetEnd;
    }
}
