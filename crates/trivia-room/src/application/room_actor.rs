//! The room task.
//!
//! One tokio task owns one [`RoomMachine`]. Commands arrive on a bounded
//! mpsc queue and are applied strictly in arrival order; timers are a
//! `sleep_until` on the machine's next deadline, raced against the queue.
//! Nothing else ever mutates the room, so buzzer arbitration and scoring
//! need no locks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use trivia_core::clock::Clock;
use trivia_core::config::GameConfig;
use trivia_core::error::OrchestratorError;
use trivia_core::event::{InboundEvent, JoinOutcome, QueueOutcome};
use trivia_core::model::RoomListItem;
use trivia_core::publisher::Publisher;
use trivia_core::repository::PlayerProgress;
use trivia_scheduler::domain::join_queue::JoinRequest;
use trivia_scheduler::domain::quiz_set::QuizSet;
use trivia_scheduler::domain::schedule::SetBoundary;
use uuid::Uuid;

use super::persistence::PersistenceWriter;
use crate::domain::machine::{Effect, FlushReport, RoomMachine, RoomSnapshot};

/// Messages understood by a room task.
#[derive(Debug)]
pub enum RoomCommand {
    /// Direct join.
    Join {
        /// The player.
        request: JoinRequest,
        /// Outcome channel.
        reply: oneshot::Sender<JoinOutcome>,
    },
    /// Pre-window queued join.
    QueueJoin {
        /// The player.
        request: JoinRequest,
        /// Outcome channel.
        reply: oneshot::Sender<QueueOutcome>,
    },
    /// Flush the join queue now.
    FlushQueue {
        /// Report channel.
        reply: oneshot::Sender<FlushReport>,
    },
    /// Remove a player.
    Leave {
        /// The player.
        user_id: String,
        /// Hold the slot for the reserve grace period.
        reserve: bool,
        /// Whether anything was removed.
        reply: oneshot::Sender<bool>,
    },
    /// A validated client event.
    Inbound(InboundEvent),
    /// Start the set.
    StartSet {
        /// The set with its questions.
        set: QuizSet,
        /// Whether the set started.
        reply: oneshot::Sender<Result<bool, OrchestratorError>>,
    },
    /// Reset for the next set.
    PrepareSet {
        /// The upcoming set.
        set_id: Uuid,
        /// Refreshed configuration.
        config: Box<GameConfig>,
        /// Result channel.
        reply: oneshot::Sender<Result<(), OrchestratorError>>,
    },
    /// Account progress finished loading.
    ProgressLoaded {
        /// The player.
        user_id: String,
        /// The loaded progress.
        progress: PlayerProgress,
    },
    /// Report a snapshot.
    Snapshot {
        /// Snapshot channel.
        reply: oneshot::Sender<RoomSnapshot>,
    },
    /// Stop the task if the room is idle.
    Retire {
        /// Whether the room was idle and stopped.
        reply: oneshot::Sender<bool>,
    },
    /// Stop the task.
    Shutdown,
}

/// Collaborators a room task needs.
#[derive(Clone)]
pub struct RoomDeps {
    /// Wall clock.
    pub clock: Arc<dyn Clock>,
    /// Outbound event sink.
    pub publisher: Arc<dyn Publisher>,
    /// Storage writer.
    pub writer: Arc<PersistenceWriter>,
    /// Set boundary broadcast by the set clock.
    pub boundary: watch::Receiver<SetBoundary>,
}

impl std::fmt::Debug for RoomDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomDeps").finish_non_exhaustive()
    }
}

/// Cloneable handle to a running room.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    id: Uuid,
    tx: mpsc::Sender<RoomCommand>,
    listing: watch::Receiver<RoomListItem>,
}

fn room_closed(id: Uuid) -> OrchestratorError {
    OrchestratorError::Infrastructure(format!("room {id} task is not running"))
}

impl RoomHandle {
    /// Room identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Latest lobby listing published by the room.
    #[must_use]
    pub fn listing(&self) -> RoomListItem {
        self.listing.borrow().clone()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, OrchestratorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| room_closed(self.id))?;
        rx.await.map_err(|_| room_closed(self.id))
    }

    /// Direct join.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Infrastructure` if the room task stopped.
    pub async fn join(&self, request: JoinRequest) -> Result<JoinOutcome, OrchestratorError> {
        self.request(|reply| RoomCommand::Join { request, reply }).await
    }

    /// Queued join.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Infrastructure` if the room task stopped.
    pub async fn queue_join(&self, request: JoinRequest) -> Result<QueueOutcome, OrchestratorError> {
        self.request(|reply| RoomCommand::QueueJoin { request, reply })
            .await
    }

    /// Flushes the join queue.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Infrastructure` if the room task stopped.
    pub async fn flush_queue(&self) -> Result<FlushReport, OrchestratorError> {
        self.request(|reply| RoomCommand::FlushQueue { reply }).await
    }

    /// Removes a player.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Infrastructure` if the room task stopped.
    pub async fn leave(&self, user_id: &str, reserve: bool) -> Result<bool, OrchestratorError> {
        let user_id = user_id.to_owned();
        self.request(|reply| RoomCommand::Leave {
            user_id,
            reserve,
            reply,
        })
        .await
    }

    /// Enqueues a client event without waiting. Events are never dropped
    /// silently: a full queue is reported to the caller.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Infrastructure` if the room's queue is
    /// full or the task stopped.
    pub fn submit(&self, event: InboundEvent) -> Result<(), OrchestratorError> {
        self.tx
            .try_send(RoomCommand::Inbound(event))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => OrchestratorError::Infrastructure(format!(
                    "room {} event queue is full",
                    self.id
                )),
                mpsc::error::TrySendError::Closed(_) => room_closed(self.id),
            })
    }

    /// Starts a set.
    ///
    /// # Errors
    ///
    /// Returns the machine's error, or `OrchestratorError::Infrastructure`
    /// if the room task stopped.
    pub async fn start_set(&self, set: QuizSet) -> Result<bool, OrchestratorError> {
        self.request(|reply| RoomCommand::StartSet { set, reply })
            .await?
    }

    /// Prepares the room for the next set.
    ///
    /// # Errors
    ///
    /// Returns the machine's error, or `OrchestratorError::Infrastructure`
    /// if the room task stopped.
    pub async fn prepare_set(&self, set_id: Uuid, config: GameConfig) -> Result<(), OrchestratorError> {
        self.request(|reply| RoomCommand::PrepareSet {
            set_id,
            config: Box::new(config),
            reply,
        })
        .await?
    }

    /// Takes a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Infrastructure` if the room task stopped.
    pub async fn snapshot(&self) -> Result<RoomSnapshot, OrchestratorError> {
        self.request(|reply| RoomCommand::Snapshot { reply }).await
    }

    /// Stops the task if nobody is seated, reserved or queued and no set is
    /// running. The check and the stop happen on the room's own task, so no
    /// join can land in between.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Infrastructure` if the room task stopped.
    pub async fn retire_if_idle(&self) -> Result<bool, OrchestratorError> {
        self.request(|reply| RoomCommand::Retire { reply }).await
    }

    /// Asks the task to stop after the commands already queued.
    pub async fn shutdown(&self) {
        if self.tx.send(RoomCommand::Shutdown).await.is_err() {
            debug!(room_id = %self.id, "room task already stopped");
        }
    }
}

/// Spawns the task owning `machine`.
#[must_use]
pub fn spawn_room(
    machine: RoomMachine,
    deps: RoomDeps,
    queue_capacity: usize,
) -> (RoomHandle, JoinHandle<()>) {
    let id = machine.id();
    let (tx, rx) = mpsc::channel(queue_capacity.max(1));
    let (listing_tx, listing_rx) = watch::channel(machine.listing());
    let actor = RoomActor {
        machine,
        rx,
        mailbox: tx.downgrade(),
        deps,
        listing: listing_tx,
    };
    let task = tokio::spawn(actor.run());
    (
        RoomHandle {
            id,
            tx,
            listing: listing_rx,
        },
        task,
    )
}

struct RoomActor {
    machine: RoomMachine,
    rx: mpsc::Receiver<RoomCommand>,
    mailbox: mpsc::WeakSender<RoomCommand>,
    deps: RoomDeps,
    listing: watch::Sender<RoomListItem>,
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl RoomActor {
    async fn run(mut self) {
        let room_id = self.machine.id();
        info!(%room_id, "room task started");
        loop {
            let deadline = self.machine.next_deadline().map(|at| {
                let delay = (at - self.deps.clock.now())
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                Instant::now() + delay
            });
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(RoomCommand::Shutdown) | None => break,
                    Some(RoomCommand::Retire { reply }) => {
                        let idle = self.machine.is_idle();
                        reply.send(idle).ok();
                        if idle {
                            break;
                        }
                    }
                    Some(command) => self.handle(command),
                },
                () = wait_until(deadline) => {
                    let now = self.deps.clock.now();
                    self.machine.on_timer(now);
                }
            }
            self.apply_effects();
            let listing = self.machine.listing();
            self.listing.send_if_modified(|current| {
                if *current == listing {
                    false
                } else {
                    *current = listing;
                    true
                }
            });
        }
        info!(%room_id, "room task stopped");
    }

    fn handle(&mut self, command: RoomCommand) {
        let now = self.deps.clock.now();
        match command {
            RoomCommand::Join { request, reply } => {
                let boundary = *self.deps.boundary.borrow();
                let outcome = self.machine.join(&request, &boundary, now);
                debug!(room_id = %self.machine.id(), user_id = %request.user_id, ?outcome, "join");
                reply.send(outcome).ok();
            }
            RoomCommand::QueueJoin { request, reply } => {
                let boundary = *self.deps.boundary.borrow();
                let outcome = self.machine.queue_join(request, &boundary, now);
                reply.send(outcome).ok();
            }
            RoomCommand::FlushQueue { reply } => {
                let report = self.machine.flush_queue(now);
                reply.send(report).ok();
            }
            RoomCommand::Leave {
                user_id,
                reserve,
                reply,
            } => {
                let left = self.machine.leave(&user_id, reserve, now);
                reply.send(left).ok();
            }
            RoomCommand::Inbound(event) => {
                if let Err(e) = self.machine.handle_inbound(&event, now) {
                    match &e {
                        OrchestratorError::InvalidTransition { .. } => {
                            debug!(room_id = %self.machine.id(), event = event.name(), error = %e, "event rejected");
                        }
                        _ => {
                            warn!(room_id = %self.machine.id(), event = event.name(), error = %e, "event rejected");
                        }
                    }
                }
            }
            RoomCommand::StartSet { set, reply } => {
                let result = self.machine.start_set(set, now);
                if let Err(e) = &result {
                    warn!(room_id = %self.machine.id(), error = %e, "set not started");
                }
                reply.send(result).ok();
            }
            RoomCommand::PrepareSet {
                set_id,
                config,
                reply,
            } => {
                reply.send(self.machine.prepare_set(set_id, *config)).ok();
            }
            RoomCommand::ProgressLoaded { user_id, progress } => {
                self.machine.progress_loaded(&user_id, &progress);
            }
            RoomCommand::Snapshot { reply } => {
                reply.send(self.machine.snapshot()).ok();
            }
            RoomCommand::Retire { .. } | RoomCommand::Shutdown => {}
        }
    }

    fn apply_effects(&mut self) {
        for effect in self.machine.take_effects() {
            match effect {
                Effect::Publish(channel, event) => self.deps.publisher.publish(channel, event),
                Effect::Persist(op) => {
                    self.deps.writer.submit(op);
                }
                Effect::LoadProgress(user_id) => self.load_progress(user_id),
            }
        }
    }

    fn load_progress(&self, user_id: String) {
        let writer = Arc::clone(&self.deps.writer);
        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            let progress = writer.load_progress(&user_id).await;
            let Some(tx) = mailbox.upgrade() else {
                return;
            };
            if tx
                .send(RoomCommand::ProgressLoaded { user_id, progress })
                .await
                .is_err()
            {
                debug!("room stopped before progress arrived");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use trivia_core::backoff::BackoffPolicy;
    use trivia_core::event::{AnswerPayload, BuzzPayload};
    use trivia_core::model::Difficulty;
    use trivia_core::publisher::Channel;
    use trivia_core::repository::PlayerProgress;
    use trivia_scheduler::domain::schedule::WindowPhase;
    use trivia_test_support::{
        InMemoryStorage, MockRng, RecordingPublisher, TokioClock, sample_questions,
    };

    use super::*;
    use crate::domain::machine::{RoomInfo, RoomPhase};

    struct Fixture {
        handle: RoomHandle,
        task: JoinHandle<()>,
        publisher: Arc<RecordingPublisher>,
        store: Arc<InMemoryStorage>,
        _boundary: watch::Sender<SetBoundary>,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 28, 0).unwrap()
    }

    fn fixture(queue_capacity: usize) -> Fixture {
        let store = Arc::new(InMemoryStorage::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let (boundary_tx, boundary_rx) = watch::channel(SetBoundary {
            set_start: t0() + TimeDelta::minutes(2),
            set_end: t0() + TimeDelta::minutes(22),
            join_opens_at: t0(),
            phase: WindowPhase::JoinOpen,
        });
        let writer = Arc::new(PersistenceWriter::new(
            store.clone(),
            store.clone(),
            BackoffPolicy::default(),
            Box::new(MockRng),
        ));
        let machine = RoomMachine::new(
            RoomInfo {
                id: Uuid::new_v4(),
                name: "Room 1".to_owned(),
                difficulty: Difficulty::Easy,
                max_players: 20,
            },
            Uuid::new_v4(),
            GameConfig::default(),
        );
        let deps = RoomDeps {
            clock: Arc::new(TokioClock::starting_at(t0())),
            publisher: publisher.clone(),
            writer,
            boundary: boundary_rx,
        };
        let (handle, task) = spawn_room(machine, deps, queue_capacity);
        Fixture {
            handle,
            task,
            publisher,
            store,
            _boundary: boundary_tx,
        }
    }

    fn request(user_id: &str) -> JoinRequest {
        JoinRequest {
            user_id: user_id.to_owned(),
            display_name: user_id.to_uppercase(),
            is_ai: false,
            connection_id: None,
        }
    }

    fn quiz_set(count: usize) -> QuizSet {
        QuizSet {
            id: Uuid::new_v4(),
            start_time: t0() + TimeDelta::minutes(2),
            end_time: t0() + TimeDelta::minutes(22),
            questions: Arc::new(Vec::new()),
            status: trivia_core::model::SetStatus::Scheduled,
        }
        .activate(sample_questions(count, "general"))
    }

    fn buzz(player: &str) -> InboundEvent {
        InboundEvent::Buzz(BuzzPayload {
            player_id: player.to_owned(),
            timestamp: 1_000,
            latency: 40.0,
        })
    }

    fn answer(player: &str, index: usize) -> InboundEvent {
        InboundEvent::Answer(AnswerPayload {
            player_id: player.to_owned(),
            answer_index: index,
            message_id: Some(Uuid::new_v4()),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_set_runs_on_room_timers() {
        // Arrange
        let fx = fixture(64);
        let room = Channel::Room(fx.handle.id());
        assert_eq!(fx.handle.join(request("a")).await.unwrap(), JoinOutcome::Success);
        assert_eq!(fx.handle.join(request("b")).await.unwrap(), JoinOutcome::Success);
        assert!(fx.handle.start_set(quiz_set(2)).await.unwrap());

        // Act: buzz and answer the first question, let the second time out.
        tokio::time::sleep(Duration::from_millis(3_010)).await;
        fx.handle.submit(buzz("a")).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        fx.handle.submit(answer("a", 0)).unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        // Assert
        assert_eq!(fx.publisher.count(room, "question_start"), 2);
        assert_eq!(fx.publisher.count(room, "buzz"), 1);
        assert_eq!(fx.publisher.count(room, "answer"), 1);
        assert_eq!(fx.publisher.count(room, "question_end"), 2);
        assert_eq!(fx.publisher.count(room, "set_end"), 1);
        assert_eq!(fx.store.asked(), vec!["q-0".to_owned(), "q-1".to_owned()]);
        assert_eq!(fx.store.answered_correctly(), vec!["q-0".to_owned()]);
        assert_eq!(fx.store.scores().len(), 1);
        assert_eq!(fx.store.summaries().len(), 1);
        let snapshot = fx.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, RoomPhase::SetEnd);
        assert_eq!(snapshot.leaderboard[0].user_id, "a");
        assert_eq!(fx.handle.listing().status, trivia_core::model::RoomStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loaded_progress_feeds_badge_evaluation() {
        // Arrange
        let fx = fixture(64);
        fx.store.set_progress(
            "a",
            PlayerProgress {
                badges: vec!["first_correct".to_owned()],
                lifetime_correct: 24,
            },
        );
        fx.handle.join(request("a")).await.unwrap();
        fx.handle.start_set(quiz_set(1)).await.unwrap();

        // Act
        tokio::time::sleep(Duration::from_millis(3_010)).await;
        fx.handle.submit(buzz("a")).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        fx.handle.submit(answer("a", 0)).unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        // Assert
        let mut badges: Vec<String> = fx.store.badges().into_iter().map(|(_, b, _)| b).collect();
        badges.sort();
        assert_eq!(badges, vec!["quick_draw".to_owned(), "sharpshooter_25".to_owned()]);
    }

    #[tokio::test]
    async fn test_submit_reports_full_event_queue() {
        // The room task has not been polled yet, so nothing drains the queue.
        let fx = fixture(1);

        let first = fx.handle.submit(buzz("a"));
        let second = fx.handle.submit(buzz("a"));

        assert!(first.is_ok());
        assert!(matches!(second, Err(OrchestratorError::Infrastructure(_))));
    }

    #[tokio::test]
    async fn test_listing_follows_joins() {
        let fx = fixture(16);

        fx.handle.join(request("a")).await.unwrap();
        fx.handle.snapshot().await.unwrap();

        assert_eq!(fx.handle.listing().current_players, 1);
    }

    #[tokio::test]
    async fn test_dropping_every_handle_stops_the_task() {
        let fx = fixture(16);
        let Fixture { handle, task, .. } = fx;

        drop(handle);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
