//! Session identities and the channel scopes they join.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A channel scope within which an identity may hold one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Scope {
    /// The lobby.
    Lobby,
    /// One room.
    Room(Uuid),
}

/// One live connection of a verified user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionIdentity {
    /// The user.
    pub user_id: String,
    /// Display name supplied by the identity collaborator.
    pub display_name: String,
    /// Whether the account is on the free tier.
    pub free_tier: bool,
    /// The transport connection.
    pub connection_id: Uuid,
    /// Scopes this connection is authoritative for.
    pub joined_channels: BTreeSet<Scope>,
    /// When the connection was opened.
    pub connected_at: DateTime<Utc>,
    /// Last activity signal.
    pub last_activity_at: DateTime<Utc>,
    /// Set while the client reports itself hidden.
    pub hidden_since: Option<DateTime<Utc>>,
}

impl SessionIdentity {
    /// The rooms this connection occupies.
    pub fn rooms(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.joined_channels.iter().filter_map(|scope| match scope {
            Scope::Room(id) => Some(*id),
            Scope::Lobby => None,
        })
    }
}

/// Why a session was administratively disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// No activity signal for the idle threshold.
    Idle,
    /// Hidden longer than the hidden threshold.
    Hidden,
    /// Superseded by a newer connection of the same user.
    Duplicate,
    /// Closed by the client or transport.
    Closed,
}

/// A session that was torn down, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndedSession {
    /// The session as it was when it ended.
    pub identity: SessionIdentity,
    /// Why it ended.
    pub reason: DisconnectReason,
}
