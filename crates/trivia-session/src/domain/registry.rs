//! The presence registry: who holds the authoritative connection where.
//!
//! Pure state with no clocks or I/O; every operation takes `now`.

use std::collections::{BTreeSet, HashMap, VecDeque};

use chrono::{DateTime, TimeDelta, Utc};
use trivia_core::error::OrchestratorError;
use trivia_core::model::VerifiedIdentity;
use uuid::Uuid;

use super::identity::{DisconnectReason, EndedSession, Scope, SessionIdentity};

/// Result of joining a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The connection is now authoritative for the scope.
    Joined,
    /// The connection already held the scope.
    AlreadyJoined,
    /// The connection is now authoritative; an older connection of the same
    /// user was torn down and must be told to self-terminate.
    Superseded {
        /// The evicted session.
        evicted: EndedSession,
    },
}

/// Superseded connection ids remembered so their late requests can be told
/// they were replaced.
const SUPERSEDED_CAPACITY: usize = 1024;

/// Tracks live sessions and enforces at most one authoritative connection per
/// `(user, scope)`.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    sessions: HashMap<Uuid, SessionIdentity>,
    authority: HashMap<(String, Scope), Uuid>,
    superseded: HashMap<Uuid, String>,
    superseded_order: VecDeque<Uuid>,
}

impl PresenceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection and joins it to `scope`.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Malformed` if `connection_id` is already
    /// registered.
    pub fn connect(
        &mut self,
        identity: &VerifiedIdentity,
        connection_id: Uuid,
        scope: Scope,
        now: DateTime<Utc>,
    ) -> Result<JoinOutcome, OrchestratorError> {
        if self.sessions.contains_key(&connection_id) {
            return Err(OrchestratorError::Malformed(format!(
                "connection {connection_id} already registered"
            )));
        }
        self.superseded.remove(&connection_id);
        self.sessions.insert(
            connection_id,
            SessionIdentity {
                user_id: identity.user_id.clone(),
                display_name: identity.display_name.clone(),
                free_tier: identity.free_tier,
                connection_id,
                joined_channels: BTreeSet::new(),
                connected_at: now,
                last_activity_at: now,
                hidden_since: None,
            },
        );
        self.join(connection_id, scope, now)
    }

    /// Makes `connection_id` authoritative for `scope`, evicting any other
    /// connection of the same user that held it.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Malformed` if the connection is unknown.
    pub fn join(
        &mut self,
        connection_id: Uuid,
        scope: Scope,
        now: DateTime<Utc>,
    ) -> Result<JoinOutcome, OrchestratorError> {
        let user_id = self
            .sessions
            .get(&connection_id)
            .map(|s| s.user_id.clone())
            .ok_or_else(|| unknown_connection(connection_id))?;

        let key = (user_id, scope);
        let previous = self.authority.get(&key).copied();
        if previous == Some(connection_id) {
            self.touch(connection_id, now);
            return Ok(JoinOutcome::AlreadyJoined);
        }

        let evicted = previous.and_then(|older| self.remove(older, DisconnectReason::Duplicate));
        if let Some(evicted) = &evicted {
            self.remember_superseded(&evicted.identity);
        }

        self.authority.insert(key, connection_id);
        if let Some(session) = self.sessions.get_mut(&connection_id) {
            session.joined_channels.insert(scope);
            session.last_activity_at = now;
        }

        Ok(match evicted {
            Some(evicted) => JoinOutcome::Superseded { evicted },
            None => JoinOutcome::Joined,
        })
    }

    /// Releases `scope` for `connection_id`. Returns `false` if the
    /// connection did not hold it.
    pub fn leave(&mut self, connection_id: Uuid, scope: Scope) -> bool {
        let Some(session) = self.sessions.get_mut(&connection_id) else {
            return false;
        };
        if !session.joined_channels.remove(&scope) {
            return false;
        }
        let key = (session.user_id.clone(), scope);
        if self.authority.get(&key) == Some(&connection_id) {
            self.authority.remove(&key);
        }
        true
    }

    /// Records an activity signal. Returns `false` for unknown connections.
    pub fn touch(&mut self, connection_id: Uuid, now: DateTime<Utc>) -> bool {
        match self.sessions.get_mut(&connection_id) {
            Some(session) => {
                session.last_activity_at = session.last_activity_at.max(now);
                true
            }
            None => false,
        }
    }

    /// Records a visibility change. Becoming visible counts as activity.
    pub fn set_hidden(&mut self, connection_id: Uuid, hidden: bool, now: DateTime<Utc>) -> bool {
        let Some(session) = self.sessions.get_mut(&connection_id) else {
            return false;
        };
        if hidden {
            session.hidden_since.get_or_insert(now);
        } else {
            session.hidden_since = None;
            session.last_activity_at = session.last_activity_at.max(now);
        }
        true
    }

    /// Tears down a connection at the client's request.
    pub fn disconnect(&mut self, connection_id: Uuid) -> Option<EndedSession> {
        self.remove(connection_id, DisconnectReason::Closed)
    }

    /// Tears down every session idle longer than `idle_timeout` or hidden
    /// longer than `hidden_timeout`.
    pub fn sweep(
        &mut self,
        now: DateTime<Utc>,
        idle_timeout: TimeDelta,
        hidden_timeout: TimeDelta,
    ) -> Vec<EndedSession> {
        let mut expired: Vec<(Uuid, DisconnectReason)> = self
            .sessions
            .values()
            .filter_map(|s| {
                if s.hidden_since.is_some_and(|since| now - since > hidden_timeout) {
                    Some((s.connection_id, DisconnectReason::Hidden))
                } else if now - s.last_activity_at > idle_timeout {
                    Some((s.connection_id, DisconnectReason::Idle))
                } else {
                    None
                }
            })
            .collect();
        expired.sort_by_key(|(id, _)| *id);

        expired
            .into_iter()
            .filter_map(|(id, reason)| self.remove(id, reason))
            .collect()
    }

    /// The connection authoritative for `(user_id, scope)`, if any.
    #[must_use]
    pub fn authoritative(&self, user_id: &str, scope: Scope) -> Option<Uuid> {
        self.authority.get(&(user_id.to_owned(), scope)).copied()
    }

    /// Whether `connection_id` is the authoritative connection of its user
    /// for `scope`.
    #[must_use]
    pub fn is_authoritative(&self, connection_id: Uuid, scope: Scope) -> bool {
        self.sessions
            .get(&connection_id)
            .is_some_and(|s| self.authoritative(&s.user_id, scope) == Some(connection_id))
    }

    /// Looks up a session.
    #[must_use]
    pub fn get(&self, connection_id: Uuid) -> Option<&SessionIdentity> {
        self.sessions.get(&connection_id)
    }

    /// Looks up a live session.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::DuplicateSession` if the connection was
    /// superseded by a newer one, or `OrchestratorError::Malformed` if it was
    /// never registered or has disconnected.
    pub fn require(&self, connection_id: Uuid) -> Result<&SessionIdentity, OrchestratorError> {
        if let Some(session) = self.sessions.get(&connection_id) {
            return Ok(session);
        }
        match self.superseded.get(&connection_id) {
            Some(user_id) => Err(OrchestratorError::DuplicateSession {
                user_id: user_id.clone(),
            }),
            None => Err(unknown_connection(connection_id)),
        }
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Distinct users currently connected to the lobby.
    #[must_use]
    pub fn online_users(&self) -> usize {
        self.authority
            .keys()
            .filter(|(_, scope)| *scope == Scope::Lobby)
            .count()
    }

    fn remember_superseded(&mut self, identity: &SessionIdentity) {
        if self.superseded_order.len() == SUPERSEDED_CAPACITY {
            if let Some(oldest) = self.superseded_order.pop_front() {
                self.superseded.remove(&oldest);
            }
        }
        self.superseded
            .insert(identity.connection_id, identity.user_id.clone());
        self.superseded_order.push_back(identity.connection_id);
    }

    fn remove(&mut self, connection_id: Uuid, reason: DisconnectReason) -> Option<EndedSession> {
        let identity = self.sessions.remove(&connection_id)?;
        for scope in &identity.joined_channels {
            let key = (identity.user_id.clone(), *scope);
            if self.authority.get(&key) == Some(&connection_id) {
                self.authority.remove(&key);
            }
        }
        Some(EndedSession { identity, reason })
    }
}

fn unknown_connection(connection_id: Uuid) -> OrchestratorError {
    OrchestratorError::Malformed(format!("unknown connection {connection_id}"))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn identity(user_id: &str) -> VerifiedIdentity {
        VerifiedIdentity {
            user_id: user_id.to_owned(),
            display_name: format!("{user_id} name"),
            free_tier: false,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_second_connection_supersedes_first_in_same_scope() {
        // Arrange
        let mut registry = PresenceRegistry::new();
        let older = Uuid::new_v4();
        let newer = Uuid::new_v4();
        registry
            .connect(&identity("u-1"), older, Scope::Lobby, t0())
            .unwrap();

        // Act
        let outcome = registry
            .connect(&identity("u-1"), newer, Scope::Lobby, t0())
            .unwrap();

        // Assert
        match outcome {
            JoinOutcome::Superseded { evicted } => {
                assert_eq!(evicted.identity.connection_id, older);
                assert_eq!(evicted.reason, DisconnectReason::Duplicate);
            }
            other => panic!("expected Superseded, got {other:?}"),
        }
        assert_eq!(registry.authoritative("u-1", Scope::Lobby), Some(newer));
        assert!(registry.get(older).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_superseded_connection_is_reported_as_duplicate() {
        // Arrange
        let mut registry = PresenceRegistry::new();
        let older = Uuid::new_v4();
        let newer = Uuid::new_v4();
        registry
            .connect(&identity("u-1"), older, Scope::Lobby, t0())
            .unwrap();
        registry
            .connect(&identity("u-1"), newer, Scope::Lobby, t0())
            .unwrap();

        // Act
        let stale = registry.require(older);
        let unknown = registry.require(Uuid::new_v4());

        // Assert
        assert!(matches!(
            stale,
            Err(OrchestratorError::DuplicateSession { user_id }) if user_id == "u-1"
        ));
        assert!(matches!(unknown, Err(OrchestratorError::Malformed(_))));
        assert_eq!(registry.require(newer).unwrap().connection_id, newer);
    }

    #[test]
    fn test_superseded_memory_is_bounded() {
        let mut registry = PresenceRegistry::new();
        let first = Uuid::new_v4();
        registry
            .connect(&identity("u-1"), first, Scope::Lobby, t0())
            .unwrap();
        for _ in 0..SUPERSEDED_CAPACITY {
            registry
                .connect(&identity("u-1"), Uuid::new_v4(), Scope::Lobby, t0())
                .unwrap();
        }

        let result = registry.require(first);

        assert!(matches!(result, Err(OrchestratorError::Malformed(_))));
    }

    #[test]
    fn test_different_users_do_not_evict_each_other() {
        let mut registry = PresenceRegistry::new();
        registry
            .connect(&identity("u-1"), Uuid::new_v4(), Scope::Lobby, t0())
            .unwrap();

        let outcome = registry
            .connect(&identity("u-2"), Uuid::new_v4(), Scope::Lobby, t0())
            .unwrap();

        assert_eq!(outcome, JoinOutcome::Joined);
        assert_eq!(registry.online_users(), 2);
    }

    #[test]
    fn test_room_join_by_new_connection_evicts_old_room_holder() {
        // Arrange
        let mut registry = PresenceRegistry::new();
        let room = Scope::Room(Uuid::new_v4());
        let older = Uuid::new_v4();
        let newer = Uuid::new_v4();
        registry
            .connect(&identity("u-1"), older, Scope::Lobby, t0())
            .unwrap();
        registry.join(older, room, t0()).unwrap();

        // Act
        let outcome = registry
            .connect(&identity("u-1"), newer, room, t0())
            .unwrap();

        // Assert
        let JoinOutcome::Superseded { evicted } = outcome else {
            panic!("expected Superseded");
        };
        assert_eq!(evicted.identity.rooms().collect::<Vec<_>>().len(), 1);
        assert!(registry.is_authoritative(newer, room));
        assert_eq!(registry.authoritative("u-1", Scope::Lobby), None);
    }

    #[test]
    fn test_rejoining_same_scope_is_idempotent() {
        let mut registry = PresenceRegistry::new();
        let connection = Uuid::new_v4();
        registry
            .connect(&identity("u-1"), connection, Scope::Lobby, t0())
            .unwrap();

        let outcome = registry.join(connection, Scope::Lobby, t0()).unwrap();

        assert_eq!(outcome, JoinOutcome::AlreadyJoined);
    }

    #[test]
    fn test_join_unknown_connection_is_malformed() {
        let mut registry = PresenceRegistry::new();

        let result = registry.join(Uuid::new_v4(), Scope::Lobby, t0());

        assert!(matches!(result, Err(OrchestratorError::Malformed(_))));
    }

    #[test]
    fn test_sweep_disconnects_idle_session() {
        // Arrange
        let mut registry = PresenceRegistry::new();
        let idle = Uuid::new_v4();
        let active = Uuid::new_v4();
        registry
            .connect(&identity("u-1"), idle, Scope::Lobby, t0())
            .unwrap();
        registry
            .connect(&identity("u-2"), active, Scope::Lobby, t0())
            .unwrap();
        registry.touch(active, t0() + TimeDelta::seconds(50));

        // Act
        let ended = registry.sweep(
            t0() + TimeDelta::seconds(61),
            TimeDelta::seconds(60),
            TimeDelta::seconds(30),
        );

        // Assert
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].identity.connection_id, idle);
        assert_eq!(ended[0].reason, DisconnectReason::Idle);
        assert!(registry.get(active).is_some());
    }

    #[test]
    fn test_sweep_disconnects_long_hidden_session_even_if_recently_active() {
        let mut registry = PresenceRegistry::new();
        let connection = Uuid::new_v4();
        registry
            .connect(&identity("u-1"), connection, Scope::Lobby, t0())
            .unwrap();
        registry.set_hidden(connection, true, t0());
        registry.touch(connection, t0() + TimeDelta::seconds(25));

        let ended = registry.sweep(
            t0() + TimeDelta::seconds(31),
            TimeDelta::seconds(60),
            TimeDelta::seconds(30),
        );

        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].reason, DisconnectReason::Hidden);
    }

    #[test]
    fn test_becoming_visible_clears_hidden_timer() {
        let mut registry = PresenceRegistry::new();
        let connection = Uuid::new_v4();
        registry
            .connect(&identity("u-1"), connection, Scope::Lobby, t0())
            .unwrap();
        registry.set_hidden(connection, true, t0());
        registry.set_hidden(connection, false, t0() + TimeDelta::seconds(20));

        let ended = registry.sweep(
            t0() + TimeDelta::seconds(45),
            TimeDelta::seconds(60),
            TimeDelta::seconds(30),
        );

        assert!(ended.is_empty());
    }

    #[test]
    fn test_leave_releases_scope_authority() {
        let mut registry = PresenceRegistry::new();
        let connection = Uuid::new_v4();
        let room = Scope::Room(Uuid::new_v4());
        registry
            .connect(&identity("u-1"), connection, room, t0())
            .unwrap();

        assert!(registry.leave(connection, room));
        assert!(!registry.leave(connection, room));
        assert_eq!(registry.authoritative("u-1", room), None);
    }
}
