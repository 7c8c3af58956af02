//! FIFO queue of players waiting for a room's join window to open.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A player asking for a seat in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// The player.
    pub user_id: String,
    /// Display name.
    pub display_name: String,
    /// Whether the player is a bot.
    pub is_ai: bool,
    /// Connection to notify about the outcome, if any.
    pub connection_id: Option<Uuid>,
}

/// A queued request and when it was queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJoin {
    /// The request.
    pub request: JoinRequest,
    /// When it entered the queue.
    pub queued_at: DateTime<Utc>,
}

/// Per-room FIFO join queue. A user appears at most once.
#[derive(Debug, Default)]
pub struct JoinQueue {
    entries: VecDeque<QueuedJoin>,
}

impl JoinQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `request` and returns its one-based position. A user already
    /// queued keeps their original position.
    pub fn enqueue(&mut self, request: JoinRequest, now: DateTime<Utc>) -> usize {
        if let Some(position) = self.position_of(&request.user_id) {
            return position;
        }
        self.entries.push_back(QueuedJoin {
            request,
            queued_at: now,
        });
        self.entries.len()
    }

    /// One-based position of `user_id`, if queued.
    #[must_use]
    pub fn position_of(&self, user_id: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.request.user_id == user_id)
            .map(|i| i + 1)
    }

    /// Removes `user_id` from the queue. Returns `true` if it was queued.
    pub fn remove(&mut self, user_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.request.user_id != user_id);
        before != self.entries.len()
    }

    /// Takes every entry in FIFO order.
    pub fn drain(&mut self) -> Vec<QueuedJoin> {
        self.entries.drain(..).collect()
    }

    /// Number of queued entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
