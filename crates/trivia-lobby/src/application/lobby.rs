//! The lobby: the orchestrator service that owns every room.
//!
//! Player-facing operations are checked against presence before they reach a
//! room; rooms themselves are only ever touched through their handles, so
//! every mutation of room state stays on the room's own task.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};
use trivia_core::backoff::BackoffPolicy;
use trivia_core::clock::Clock;
use trivia_core::config::GameConfig;
use trivia_core::error::OrchestratorError;
use trivia_core::event::{
    InboundEvent, JoinOutcome, LobbyStatus, OutboundEvent, QueueOutcome, RoomListPayload,
};
use trivia_core::model::{Difficulty, RoomStatus, VerifiedIdentity};
use trivia_core::publisher::{Channel, Publisher};
use trivia_core::repository::{ConfigRepository, ProgressRepository, QuestionRepository};
use trivia_core::rng::DeterministicRng;
use trivia_room::application::persistence::PersistenceWriter;
use trivia_room::application::room_actor::{RoomDeps, RoomHandle, spawn_room};
use trivia_room::domain::machine::{RoomInfo, RoomMachine, RoomSnapshot};
use trivia_scheduler::application::config_provider::{ConfigProvider, ConfigSource};
use trivia_scheduler::application::question_source::QuestionSource;
use trivia_scheduler::application::set_clock::{PhaseChange, SetClock};
use trivia_scheduler::domain::allocation::{AllocationPlan, compute_room_allocation, plan_allocation};
use trivia_scheduler::domain::join_queue::JoinRequest;
use trivia_scheduler::domain::quiz_set::QuizSet;
use trivia_scheduler::domain::schedule::{SetBoundary, SetSchedule, WindowPhase};
use trivia_session::application::presence_service::{PresenceService, PresenceThresholds};
use trivia_session::domain::identity::{EndedSession, Scope, SessionIdentity};
use trivia_session::domain::registry;
use uuid::Uuid;

use crate::domain::daily_limit::DailyLimiter;

/// Message attached to a degraded room list.
pub const DEGRADED_MESSAGE: &str = "rooms will appear shortly";

/// Message attached to a maintenance room list.
pub const MAINTENANCE_MESSAGE: &str = "down for maintenance";

/// Collaborators the lobby is built from.
pub struct LobbyDeps {
    /// Wall clock shared with every room.
    pub clock: Arc<dyn Clock>,
    /// Transport publisher.
    pub publisher: Arc<dyn Publisher>,
    /// Game configuration source.
    pub configs: Arc<dyn ConfigRepository>,
    /// Question pool.
    pub questions: Arc<dyn QuestionRepository>,
    /// Scores, badges and account progress.
    pub progress: Arc<dyn ProgressRepository>,
    /// Retry policy for config loads and storage writes.
    pub backoff: BackoffPolicy,
    /// Jitter source for config retries.
    pub config_rng: Box<dyn DeterministicRng>,
    /// Jitter source for storage write retries.
    pub write_rng: Box<dyn DeterministicRng>,
}

impl std::fmt::Debug for LobbyDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LobbyDeps")
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

/// Result of registering a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResult {
    /// The now-authoritative connection.
    pub connection_id: Uuid,
    /// The older connection that was told to self-terminate, if any.
    pub superseded: Option<Uuid>,
}

/// Result of a queue request: either a queue outcome, or a direct join when
/// the window was already open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QueueJoinResult {
    /// Handled by the room's join queue.
    Queue(QueueOutcome),
    /// Handled as a direct join.
    Join(JoinOutcome),
}

/// The orchestrator service.
pub struct Lobby {
    clock: Arc<dyn Clock>,
    publisher: Arc<dyn Publisher>,
    config: ConfigProvider,
    set_clock: SetClock,
    presence: PresenceService,
    questions: QuestionSource,
    writer: Arc<PersistenceWriter>,
    rooms: RwLock<Vec<RoomHandle>>,
    upcoming: Mutex<Option<QuizSet>>,
    daily: Mutex<DailyLimiter>,
    status: Mutex<LobbyStatus>,
    rooms_created: Mutex<usize>,
}

impl std::fmt::Debug for Lobby {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lobby")
            .field("set_clock", &self.set_clock)
            .finish_non_exhaustive()
    }
}

fn thresholds(config: &GameConfig) -> PresenceThresholds {
    PresenceThresholds {
        idle_timeout: config.idle_timeout(),
        hidden_timeout: config.hidden_timeout(),
    }
}

fn poisoned(what: &str, e: impl std::fmt::Display) -> OrchestratorError {
    OrchestratorError::Infrastructure(format!("{what} lock poisoned: {e}"))
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, OrchestratorError> {
    mutex.lock().map_err(|e| poisoned(what, e))
}

impl Lobby {
    /// Builds the lobby. The set grid is fixed from `config`; everything else
    /// follows later config refreshes.
    #[must_use]
    pub fn new(deps: LobbyDeps, config: &GameConfig) -> Self {
        let set_clock = SetClock::new(SetSchedule::from_config(config), deps.clock.clone());
        let presence = PresenceService::new(
            deps.clock.clone(),
            deps.publisher.clone(),
            thresholds(config),
        );
        let writer = Arc::new(PersistenceWriter::new(
            deps.questions.clone(),
            deps.progress,
            deps.backoff,
            deps.write_rng,
        ));
        Self {
            clock: deps.clock,
            publisher: deps.publisher,
            config: ConfigProvider::new(deps.configs, deps.backoff, deps.config_rng),
            set_clock,
            presence,
            questions: QuestionSource::new(deps.questions),
            writer,
            rooms: RwLock::new(Vec::new()),
            upcoming: Mutex::new(None),
            daily: Mutex::new(DailyLimiter::new()),
            status: Mutex::new(LobbyStatus::Open),
            rooms_created: Mutex::new(0),
        }
    }

    /// The set boundary authority.
    #[must_use]
    pub fn set_clock(&self) -> &SetClock {
        &self.set_clock
    }

    /// The configuration currently in force.
    #[must_use]
    pub fn config(&self) -> GameConfig {
        self.config.current()
    }

    /// Loads configuration and prepares rooms for whichever set is next.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Infrastructure` if an internal lock is
    /// poisoned.
    pub async fn bootstrap(&self) -> Result<(), OrchestratorError> {
        let config = self.refresh_config().await?;
        let boundary = self.set_clock.current();
        info!(phase = ?boundary.phase, set_start = %boundary.set_start, "lobby starting");
        match boundary.phase {
            WindowPhase::BeforeJoin | WindowPhase::JoinOpen => {
                self.schedule_set(boundary, &config).await?;
            }
            WindowPhase::Active => {
                // Too late to seat anyone for the running set.
                let next = self.set_clock.schedule().boundary_at(boundary.set_end);
                self.schedule_set(next, &config).await?;
            }
        }
        self.publish_room_list()
    }

    /// Re-reads the set boundary and reacts to a phase change.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Infrastructure` if an internal lock is
    /// poisoned.
    pub async fn tick(&self) -> Result<Option<PhaseChange>, OrchestratorError> {
        let Some(change) = self.set_clock.tick() else {
            return Ok(None);
        };
        let config = self.config.current();
        match change.to.phase {
            WindowPhase::BeforeJoin => {
                self.schedule_set(change.to, &config).await?;
            }
            WindowPhase::JoinOpen => {
                self.schedule_set(change.to, &config).await?;
                self.flush_queues().await?;
            }
            WindowPhase::Active => self.start_sets(&config).await?,
        }
        self.publish_room_list()?;
        Ok(Some(change))
    }

    /// Reloads configuration with retries and applies it.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Infrastructure` if an internal lock is
    /// poisoned.
    pub async fn refresh_config(&self) -> Result<GameConfig, OrchestratorError> {
        let (config, source) = self.config.load_with_retry().await;
        if source != ConfigSource::Fresh {
            warn!(?source, "serving fallback game config");
        }
        self.presence.set_thresholds(thresholds(&config))?;
        let mut status = self.lock_status()?;
        match (config.maintenance_mode, *status) {
            (true, _) => *status = LobbyStatus::Maintenance,
            (false, LobbyStatus::Maintenance) => *status = LobbyStatus::Open,
            _ => {}
        }
        Ok(config)
    }

    /// Registers a verified connection in the lobby scope and sends it the
    /// current room list. An older connection of the same user is evicted.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Malformed` if the connection id is
    /// already registered.
    pub async fn connect(
        &self,
        identity: &VerifiedIdentity,
        connection_id: Uuid,
    ) -> Result<ConnectResult, OrchestratorError> {
        let outcome = self.presence.connect(identity, connection_id, Scope::Lobby)?;
        let superseded = self.handle_eviction(outcome).await;
        self.publisher.publish(
            Channel::Connection(connection_id),
            OutboundEvent::RoomList(self.room_list()?),
        );
        Ok(ConnectResult {
            connection_id,
            superseded,
        })
    }

    /// Records client activity, and optionally a visibility change.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Malformed` if the connection is unknown, or
    /// `OrchestratorError::DuplicateSession` if it has been superseded.
    pub fn activity(&self, connection_id: Uuid, hidden: Option<bool>) -> Result<(), OrchestratorError> {
        match hidden {
            Some(hidden) => self.presence.set_hidden(connection_id, hidden),
            None => self.presence.touch(connection_id),
        }
    }

    /// Tears down a connection. Its rooms hold the player's slot for the
    /// reserve grace so a reconnect does not lose membership.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Infrastructure` if an internal lock is
    /// poisoned.
    pub async fn disconnect(&self, connection_id: Uuid) -> Result<bool, OrchestratorError> {
        let Some(ended) = self.presence.disconnect(connection_id)? else {
            return Ok(false);
        };
        self.vacate(&ended, true).await;
        self.publish_room_list()?;
        Ok(true)
    }

    /// Disconnects idle and long-hidden sessions, releasing their slots.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Infrastructure` if an internal lock is
    /// poisoned.
    pub async fn sweep_presence(&self) -> Result<usize, OrchestratorError> {
        let ended = self.presence.sweep()?;
        for session in &ended {
            self.vacate(session, false).await;
        }
        if !ended.is_empty() {
            self.publish_room_list()?;
        }
        Ok(ended.len())
    }

    /// Seats the connection's user in a room.
    ///
    /// Client-visible refusals (full, window closed, in progress, daily
    /// limit, maintenance) are outcomes, not errors.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Malformed` for an unknown connection,
    /// `OrchestratorError::DuplicateSession` for a superseded one,
    /// `OrchestratorError::RoomNotFound` for an unknown room, or
    /// `OrchestratorError::Infrastructure` if the room is gone.
    pub async fn join_room(
        &self,
        connection_id: Uuid,
        room_id: Uuid,
    ) -> Result<JoinOutcome, OrchestratorError> {
        let session = self.session(connection_id)?;
        let config = self.config.current();
        if self.is_maintenance(&config)? {
            return Ok(JoinOutcome::Maintenance);
        }
        let room = self.room(room_id)?;
        let set_id = room.listing().set_id;
        if !self.within_daily_limit(&session, set_id, &config)? {
            return Ok(JoinOutcome::DailyLimitReached);
        }

        let claim = self.presence.join(connection_id, Scope::Room(room_id))?;
        self.handle_eviction(claim).await;
        let outcome = room.join(request_for(&session)).await?;
        if outcome.is_seated() {
            self.count_entry(&session, set_id)?;
        } else {
            self.presence.leave(connection_id, Scope::Room(room_id))?;
        }
        info!(%room_id, user_id = %session.user_id, ?outcome, "join handled");
        self.publish_room_list()?;
        Ok(outcome)
    }

    /// Queues the connection's user for a room whose window has not opened
    /// yet. Once the window is open this is a direct join.
    ///
    /// # Errors
    ///
    /// As for [`Lobby::join_room`].
    pub async fn queue_join(
        &self,
        connection_id: Uuid,
        room_id: Uuid,
    ) -> Result<QueueJoinResult, OrchestratorError> {
        let session = self.session(connection_id)?;
        let config = self.config.current();
        if self.is_maintenance(&config)? {
            return Ok(QueueJoinResult::Join(JoinOutcome::Maintenance));
        }
        let room = self.room(room_id)?;
        let set_id = room.listing().set_id;
        if !self.within_daily_limit(&session, set_id, &config)? {
            return Ok(QueueJoinResult::Join(JoinOutcome::DailyLimitReached));
        }

        let claim = self.presence.join(connection_id, Scope::Room(room_id))?;
        self.handle_eviction(claim).await;
        let outcome = room.queue_join(request_for(&session)).await?;
        match outcome {
            QueueOutcome::Queued { position } => {
                self.count_entry(&session, set_id)?;
                debug!(%room_id, user_id = %session.user_id, position, "join queued");
                Ok(QueueJoinResult::Queue(outcome))
            }
            QueueOutcome::AlreadyJoined => Ok(QueueJoinResult::Queue(outcome)),
            QueueOutcome::WindowOpen => self
                .join_room(connection_id, room_id)
                .await
                .map(QueueJoinResult::Join),
            QueueOutcome::WindowClosed | QueueOutcome::InProgress => {
                self.presence.leave(connection_id, Scope::Room(room_id))?;
                Ok(QueueJoinResult::Queue(outcome))
            }
        }
    }

    /// Leaves a room. `reserve` holds the slot for the reserve grace.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Malformed` for an unknown connection or
    /// `OrchestratorError::RoomNotFound` for an unknown room.
    pub async fn leave_room(
        &self,
        connection_id: Uuid,
        room_id: Uuid,
        reserve: bool,
    ) -> Result<bool, OrchestratorError> {
        let session = self.session(connection_id)?;
        let room = self.room(room_id)?;
        self.presence.leave(connection_id, Scope::Room(room_id))?;
        let left = room.leave(&session.user_id, reserve).await?;
        self.publish_room_list()?;
        Ok(left)
    }

    /// Removes a player from a room without holding their slot.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::RoomNotFound` for an unknown room.
    pub async fn kick(&self, room_id: Uuid, user_id: &str) -> Result<bool, OrchestratorError> {
        let room = self.room(room_id)?;
        let kicked = room.leave(user_id, false).await?;
        if kicked {
            info!(%room_id, user_id, "player kicked");
            self.publish_room_list()?;
        }
        Ok(kicked)
    }

    /// Validates a raw inbound event and routes it.
    ///
    /// Activity and visibility signals go to presence; everything else must
    /// come from the authoritative connection of the player it names and is
    /// queued on the room.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Malformed` for an invalid payload or a
    /// player id that does not match the session,
    /// `OrchestratorError::DuplicateSession` from a superseded connection,
    /// or `OrchestratorError::Infrastructure` when the room queue is full.
    pub fn submit_event(
        &self,
        connection_id: Uuid,
        room_id: Uuid,
        raw: serde_json::Value,
    ) -> Result<(), OrchestratorError> {
        let event = InboundEvent::from_json(raw)?;
        match &event {
            InboundEvent::Activity => return self.presence.touch(connection_id),
            InboundEvent::Visibility(visibility) => {
                return self.presence.set_hidden(connection_id, visibility.hidden);
            }
            _ => {}
        }
        let session = self
            .presence
            .require_authoritative(connection_id, Scope::Room(room_id))?;
        if event.player_id() != Some(session.user_id.as_str()) {
            return Err(OrchestratorError::Malformed(format!(
                "{} names another player",
                event.name()
            )));
        }
        let room = self.room(room_id)?;
        self.presence.touch(connection_id)?;
        room.submit(event)
    }

    /// A point-in-time view of one room.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::RoomNotFound` for an unknown room.
    pub async fn room_snapshot(&self, room_id: Uuid) -> Result<RoomSnapshot, OrchestratorError> {
        self.room(room_id)?.snapshot().await
    }

    /// The lobby listing.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Infrastructure` if an internal lock is
    /// poisoned.
    pub fn room_list(&self) -> Result<RoomListPayload, OrchestratorError> {
        let status = *self.lock_status()?;
        let rooms = match status {
            LobbyStatus::Maintenance => Vec::new(),
            LobbyStatus::Open | LobbyStatus::Degraded => {
                self.handles()?.iter().map(RoomHandle::listing).collect()
            }
        };
        let message = match status {
            LobbyStatus::Open => None,
            LobbyStatus::Degraded => Some(DEGRADED_MESSAGE.to_owned()),
            LobbyStatus::Maintenance => Some(MAINTENANCE_MESSAGE.to_owned()),
        };
        Ok(RoomListPayload {
            rooms,
            status,
            message,
        })
    }

    /// Broadcasts the lobby listing.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Infrastructure` if an internal lock is
    /// poisoned.
    pub fn publish_room_list(&self) -> Result<(), OrchestratorError> {
        let list = self.room_list()?;
        self.publisher
            .publish(Channel::Lobby, OutboundEvent::RoomList(list));
        Ok(())
    }

    /// Stops every room task.
    pub async fn shutdown(&self) {
        let rooms = match self.rooms.write() {
            Ok(mut rooms) => std::mem::take(&mut *rooms),
            Err(e) => {
                warn!(error = %e, "room registry poisoned during shutdown");
                return;
            }
        };
        for room in rooms {
            room.shutdown().await;
        }
        info!("lobby stopped");
    }

    // --- set lifecycle ---

    /// Schedules the set starting at `boundary.set_start` once, prepares
    /// every room for it and sizes the room pool.
    async fn schedule_set(
        &self,
        boundary: SetBoundary,
        config: &GameConfig,
    ) -> Result<(), OrchestratorError> {
        if config.maintenance_mode {
            debug!("maintenance mode, no set scheduled");
            return Ok(());
        }
        let scheduled = {
            let mut upcoming = lock(&self.upcoming, "upcoming set")?;
            match upcoming.as_ref() {
                Some(set) if set.start_time == boundary.set_start => None,
                _ => {
                    let set = QuizSet::scheduled(&boundary);
                    *upcoming = Some(set.clone());
                    Some(set)
                }
            }
        };
        if let Some(set) = &scheduled {
            info!(set_id = %set.id, start = %set.start_time, "set scheduled");
            for room in self.handles()? {
                if let Err(e) = room.prepare_set(set.id, config.clone()).await {
                    warn!(room_id = %room.id(), error = %e, "room not prepared for set");
                }
            }
        }
        self.allocate(config).await
    }

    /// Grows or shrinks the room pool to match the online population.
    async fn allocate(&self, config: &GameConfig) -> Result<(), OrchestratorError> {
        let Some(set_id) = self.upcoming_set_id()? else {
            return Ok(());
        };
        let online = self.presence.online_users()?;
        let desired = compute_room_allocation(online, config.players_per_room_threshold);
        let current = self.handles()?.len();
        match plan_allocation(current, desired) {
            AllocationPlan::Grow(n) => {
                for _ in 0..n {
                    self.create_room(set_id, config)?;
                }
            }
            AllocationPlan::Shrink(n) => self.retire_idle_rooms(n).await?,
            AllocationPlan::Keep => {}
        }
        if !self.any_joinable()? {
            self.create_room(set_id, config)?;
        }
        let status = if self.any_joinable()? {
            LobbyStatus::Open
        } else {
            LobbyStatus::Degraded
        };
        self.set_status(status)?;
        debug!(online, desired, rooms = self.handles()?.len(), "rooms allocated");
        Ok(())
    }

    fn create_room(&self, set_id: Uuid, config: &GameConfig) -> Result<RoomHandle, OrchestratorError> {
        let index = {
            let mut created = lock(&self.rooms_created, "room counter")?;
            let index = *created;
            *created += 1;
            index
        };
        let info = RoomInfo {
            id: Uuid::new_v4(),
            name: format!("Room {}", index + 1),
            difficulty: Difficulty::for_index(index),
            max_players: config.max_players_per_room,
        };
        let deps = RoomDeps {
            clock: self.clock.clone(),
            publisher: self.publisher.clone(),
            writer: self.writer.clone(),
            boundary: self.set_clock.subscribe(),
        };
        let machine = RoomMachine::new(info, set_id, config.clone());
        let (handle, _task) = spawn_room(machine, deps, config.room_queue_capacity);
        info!(room_id = %handle.id(), name = %handle.listing().name, "room created");
        self.rooms
            .write()
            .map_err(|e| poisoned("room registry", e))?
            .push(handle.clone());
        Ok(handle)
    }

    /// Retires up to `count` idle rooms, newest first. A room holding a
    /// queue or a reserved slot is not idle. At least one room always stays.
    async fn retire_idle_rooms(&self, count: usize) -> Result<(), OrchestratorError> {
        let candidates: Vec<RoomHandle> = self.handles()?.into_iter().skip(1).rev().collect();
        let mut retired = 0;
        for room in candidates {
            if retired == count {
                break;
            }
            let listing = room.listing();
            if listing.current_players > 0 || listing.status == RoomStatus::InProgress {
                continue;
            }
            match room.retire_if_idle().await {
                Ok(true) => {
                    self.rooms
                        .write()
                        .map_err(|e| poisoned("room registry", e))?
                        .retain(|r| r.id() != room.id());
                    retired += 1;
                    info!(room_id = %room.id(), "idle room retired");
                }
                Ok(false) => debug!(room_id = %room.id(), "room kept, players waiting"),
                Err(e) => warn!(room_id = %room.id(), error = %e, "room not retired"),
            }
        }
        Ok(())
    }

    async fn flush_queues(&self) -> Result<(), OrchestratorError> {
        for room in self.handles()? {
            match room.flush_queue().await {
                Ok(report) if !report.admitted.is_empty() || !report.rejected.is_empty() => {
                    info!(
                        room_id = %room.id(),
                        admitted = report.admitted.len(),
                        rejected = report.rejected.len(),
                        "join queue flushed"
                    );
                }
                Ok(_) => {}
                Err(e) => warn!(room_id = %room.id(), error = %e, "join queue not flushed"),
            }
        }
        Ok(())
    }

    /// Loads the set's questions and starts it in every room that has
    /// players. A question pool that stays empty after recycling degrades
    /// the lobby instead of failing.
    async fn start_sets(&self, config: &GameConfig) -> Result<(), OrchestratorError> {
        if config.maintenance_mode {
            return Ok(());
        }
        let boundary = self.set_clock.current();
        let scheduled = lock(&self.upcoming, "upcoming set")?.clone();
        let Some(set) = scheduled.filter(|set| set.start_time == boundary.set_start) else {
            warn!(set_start = %boundary.set_start, "no set scheduled for active window");
            return Ok(());
        };
        let questions = match self
            .questions
            .load_set(&config.default_category, config.questions_per_set, &[])
            .await
        {
            Ok(questions) => questions,
            Err(e) => {
                warn!(set_id = %set.id, error = %e, "set content unavailable");
                return self.set_status(LobbyStatus::Degraded);
            }
        };
        let set = set.activate(questions);
        let mut started = 0;
        for room in self.handles()? {
            match room.start_set(set.clone()).await {
                Ok(true) => started += 1,
                Ok(false) => {}
                Err(e) => warn!(room_id = %room.id(), error = %e, "set not started"),
            }
        }
        info!(set_id = %set.id, questions = set.len(), started, "set started");
        self.set_status(LobbyStatus::Open)
    }

    // --- helpers ---

    /// Treats every room the evicted session held as left without a
    /// reserved slot. Returns the evicted connection.
    async fn handle_eviction(&self, outcome: registry::JoinOutcome) -> Option<Uuid> {
        let registry::JoinOutcome::Superseded { evicted } = outcome else {
            return None;
        };
        self.vacate(&evicted, false).await;
        Some(evicted.identity.connection_id)
    }

    async fn vacate(&self, ended: &EndedSession, reserve: bool) {
        let user_id = &ended.identity.user_id;
        for room_id in ended.identity.rooms() {
            let Ok(room) = self.room(room_id) else {
                continue;
            };
            match room.leave(user_id, reserve).await {
                Ok(left) => debug!(%room_id, %user_id, reason = ?ended.reason, reserve, left, "session left room"),
                Err(e) => warn!(%room_id, %user_id, error = %e, "room leave failed"),
            }
        }
    }

    fn session(&self, connection_id: Uuid) -> Result<SessionIdentity, OrchestratorError> {
        self.presence.require_session(connection_id)
    }

    fn room(&self, room_id: Uuid) -> Result<RoomHandle, OrchestratorError> {
        self.handles()?
            .into_iter()
            .find(|room| room.id() == room_id)
            .ok_or(OrchestratorError::RoomNotFound(room_id))
    }

    fn handles(&self) -> Result<Vec<RoomHandle>, OrchestratorError> {
        Ok(self
            .rooms
            .read()
            .map_err(|e| poisoned("room registry", e))?
            .clone())
    }

    fn any_joinable(&self) -> Result<bool, OrchestratorError> {
        Ok(self.handles()?.iter().any(|room| {
            let listing = room.listing();
            listing.status == RoomStatus::Waiting && listing.current_players < listing.max_players
        }))
    }

    fn upcoming_set_id(&self) -> Result<Option<Uuid>, OrchestratorError> {
        Ok(lock(&self.upcoming, "upcoming set")?
            .as_ref()
            .map(|set| set.id))
    }

    fn is_maintenance(&self, config: &GameConfig) -> Result<bool, OrchestratorError> {
        Ok(config.maintenance_mode || *self.lock_status()? == LobbyStatus::Maintenance)
    }

    fn within_daily_limit(
        &self,
        session: &SessionIdentity,
        set_id: Uuid,
        config: &GameConfig,
    ) -> Result<bool, OrchestratorError> {
        if !session.free_tier {
            return Ok(true);
        }
        let today = self.clock.now().date_naive();
        Ok(lock(&self.daily, "daily limit")?.allows(
            &session.user_id,
            set_id,
            today,
            config.free_tier_daily_limit,
        ))
    }

    fn count_entry(&self, session: &SessionIdentity, set_id: Uuid) -> Result<(), OrchestratorError> {
        if session.free_tier {
            let today = self.clock.now().date_naive();
            lock(&self.daily, "daily limit")?
                .record(&session.user_id, set_id, today);
        }
        Ok(())
    }

    fn lock_status(&self) -> Result<MutexGuard<'_, LobbyStatus>, OrchestratorError> {
        lock(&self.status, "lobby status")
    }

    fn set_status(&self, status: LobbyStatus) -> Result<(), OrchestratorError> {
        let mut current = self.lock_status()?;
        if *current == LobbyStatus::Maintenance || *current == status {
            return Ok(());
        }
        info!(from = ?*current, to = ?status, "lobby status changed");
        *current = status;
        Ok(())
    }
}

fn request_for(session: &SessionIdentity) -> JoinRequest {
    JoinRequest {
        user_id: session.user_id.clone(),
        display_name: session.display_name.clone(),
        is_ai: false,
        connection_id: Some(session.connection_id),
    }
}
