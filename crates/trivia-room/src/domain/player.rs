//! Players seated in a room and the slots held for players who stepped out.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use trivia_core::event::{PlayerSummary, ScoreEntry};
use trivia_core::repository::PlayerProgress;
use trivia_scheduler::domain::join_queue::JoinRequest;
use uuid::Uuid;

/// Latency samples kept for the rolling average.
pub const LATENCY_WINDOW: usize = 5;

/// A seated player and their per-set statistics.
#[derive(Debug, Clone)]
pub struct Player {
    /// Player identifier.
    pub id: String,
    /// Display name.
    pub display_name: String,
    /// Whether the player is a bot.
    pub is_ai: bool,
    /// Connection that receives per-player notices.
    pub connection_id: Option<Uuid>,
    /// When the player took the seat.
    pub joined_at: DateTime<Utc>,
    /// Score this set.
    pub score: i64,
    /// Correct answers this set.
    pub correct_count: u32,
    /// Wrong answers this set.
    pub wrong_count: u32,
    /// Consecutive correct answers.
    pub streak: u32,
    /// Correct answers across the account's lifetime.
    pub lifetime_correct: u32,
    /// One-time badges the account holds.
    pub held_badges: HashSet<String>,
    latency_samples: VecDeque<f64>,
}

impl Player {
    /// Seats a player from a join request.
    #[must_use]
    pub fn new(request: &JoinRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: request.user_id.clone(),
            display_name: request.display_name.clone(),
            is_ai: request.is_ai,
            connection_id: request.connection_id,
            joined_at: now,
            score: 0,
            correct_count: 0,
            wrong_count: 0,
            streak: 0,
            lifetime_correct: 0,
            held_badges: HashSet::new(),
            latency_samples: VecDeque::with_capacity(LATENCY_WINDOW),
        }
    }

    /// Adds a latency sample, discarding the oldest beyond the window.
    pub fn record_latency(&mut self, sample: f64) {
        if self.latency_samples.len() == LATENCY_WINDOW {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(sample);
    }

    /// Rolling average latency in milliseconds; zero without samples.
    #[must_use]
    pub fn latency(&self) -> f64 {
        if self.latency_samples.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let count = self.latency_samples.len() as f64;
        self.latency_samples.iter().sum::<f64>() / count
    }

    /// Merges account progress loaded after the player sat down.
    pub fn merge_progress(&mut self, progress: &PlayerProgress) {
        self.lifetime_correct = self.lifetime_correct.saturating_add(progress.lifetime_correct);
        self.held_badges.extend(progress.badges.iter().cloned());
    }

    /// Clears per-set statistics ahead of a new set.
    pub fn reset_for_set(&mut self) {
        self.score = 0;
        self.correct_count = 0;
        self.wrong_count = 0;
        self.streak = 0;
    }

    /// The announcement form of this player.
    #[must_use]
    pub fn summary(&self) -> PlayerSummary {
        PlayerSummary {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            is_ai: self.is_ai,
            score: self.score,
            latency: self.latency(),
        }
    }

    /// The score row of this player.
    #[must_use]
    pub fn score_entry(&self) -> ScoreEntry {
        ScoreEntry {
            user_id: self.id.clone(),
            display_name: self.display_name.clone(),
            score: self.score,
            correct_count: self.correct_count,
            wrong_count: self.wrong_count,
        }
    }
}

/// A slot held for a player who left with `reserve=true`.
#[derive(Debug, Clone)]
pub struct ReservedSlot {
    /// The player as they left.
    pub player: Player,
    /// When the slot is released.
    pub expires_at: DateTime<Utc>,
}

/// Seated players plus reserved slots. Both count toward capacity.
#[derive(Debug, Default)]
pub struct Roster {
    active: HashMap<String, Player>,
    reserved: HashMap<String, ReservedSlot>,
}

impl Roster {
    /// Creates an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Occupied slots, reserved ones included.
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.active.len() + self.reserved.len()
    }

    /// Seated players.
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Whether `user_id` is seated.
    #[must_use]
    pub fn is_active(&self, user_id: &str) -> bool {
        self.active.contains_key(user_id)
    }

    /// Whether a slot is held for `user_id`.
    #[must_use]
    pub fn is_reserved(&self, user_id: &str) -> bool {
        self.reserved.contains_key(user_id)
    }

    /// A seated player.
    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<&Player> {
        self.active.get(user_id)
    }

    /// A seated player, mutably.
    pub fn get_mut(&mut self, user_id: &str) -> Option<&mut Player> {
        self.active.get_mut(user_id)
    }

    /// A seated or reserved player, mutably.
    pub fn any_mut(&mut self, user_id: &str) -> Option<&mut Player> {
        match self.active.get_mut(user_id) {
            Some(player) => Some(player),
            None => self.reserved.get_mut(user_id).map(|slot| &mut slot.player),
        }
    }

    /// Seats `player`.
    pub fn insert(&mut self, player: Player) {
        self.active.insert(player.id.clone(), player);
    }

    /// Removes a seated player.
    pub fn remove(&mut self, user_id: &str) -> Option<Player> {
        self.active.remove(user_id)
    }

    /// Holds `player`'s slot until `expires_at`.
    pub fn reserve(&mut self, player: Player, expires_at: DateTime<Utc>) {
        self.reserved.insert(
            player.id.clone(),
            ReservedSlot { player, expires_at },
        );
    }

    /// Seats a player back into their reserved slot.
    pub fn reclaim(&mut self, user_id: &str, connection_id: Option<Uuid>) -> Option<&Player> {
        let mut slot = self.reserved.remove(user_id)?;
        if connection_id.is_some() {
            slot.player.connection_id = connection_id;
        }
        let id = slot.player.id.clone();
        self.active.insert(id.clone(), slot.player);
        self.active.get(&id)
    }

    /// Drops a reserved slot before it expires.
    pub fn release(&mut self, user_id: &str) -> Option<Player> {
        self.reserved.remove(user_id).map(|slot| slot.player)
    }

    /// Removes and returns every reservation due at `now`.
    pub fn expire_reservations(&mut self, now: DateTime<Utc>) -> Vec<Player> {
        let due: Vec<String> = self
            .reserved
            .iter()
            .filter(|(_, slot)| slot.expires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        due.into_iter()
            .filter_map(|id| self.reserved.remove(&id).map(|slot| slot.player))
            .collect()
    }

    /// The earliest reservation expiry.
    #[must_use]
    pub fn next_expiry(&self) -> Option<DateTime<Utc>> {
        self.reserved.values().map(|slot| slot.expires_at).min()
    }

    /// Seated players.
    pub fn active(&self) -> impl Iterator<Item = &Player> {
        self.active.values()
    }

    /// Seated and reserved players; standings include both.
    pub fn everyone(&self) -> impl Iterator<Item = &Player> {
        self.active
            .values()
            .chain(self.reserved.values().map(|slot| &slot.player))
    }

    /// Clears per-set statistics of every player.
    pub fn reset_for_set(&mut self) {
        for player in self.active.values_mut() {
            player.reset_for_set();
        }
        for slot in self.reserved.values_mut() {
            slot.player.reset_for_set();
        }
    }
}
