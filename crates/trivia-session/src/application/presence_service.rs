//! Presence service: the registry plus its clock and eviction notices.
//!
//! The `Mutex` is held only around synchronous registry calls and is never
//! held while publishing.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::TimeDelta;
use tracing::{info, warn};
use trivia_core::clock::Clock;
use trivia_core::error::OrchestratorError;
use trivia_core::event::{DuplicateConnectionPayload, OutboundEvent};
use trivia_core::model::VerifiedIdentity;
use trivia_core::publisher::{Channel, Publisher};
use uuid::Uuid;

use crate::domain::identity::{EndedSession, Scope, SessionIdentity};
use crate::domain::registry::{JoinOutcome, PresenceRegistry};

/// Idle and hidden thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceThresholds {
    /// No activity for longer than this disconnects.
    pub idle_timeout: TimeDelta,
    /// Hidden for longer than this disconnects.
    pub hidden_timeout: TimeDelta,
}

/// Service object owning the presence registry.
pub struct PresenceService {
    registry: Mutex<PresenceRegistry>,
    thresholds: Mutex<PresenceThresholds>,
    clock: Arc<dyn Clock>,
    publisher: Arc<dyn Publisher>,
}

impl std::fmt::Debug for PresenceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceService").finish_non_exhaustive()
    }
}

impl PresenceService {
    /// Creates a service with an empty registry.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        publisher: Arc<dyn Publisher>,
        thresholds: PresenceThresholds,
    ) -> Self {
        Self {
            registry: Mutex::new(PresenceRegistry::new()),
            thresholds: Mutex::new(thresholds),
            clock,
            publisher,
        }
    }

    fn registry(&self) -> Result<MutexGuard<'_, PresenceRegistry>, OrchestratorError> {
        self.registry.lock().map_err(|e| {
            OrchestratorError::Infrastructure(format!("presence mutex poisoned: {e}"))
        })
    }

    /// Replaces the idle/hidden thresholds, e.g. after a config refresh.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Infrastructure` if the mutex is poisoned.
    pub fn set_thresholds(&self, thresholds: PresenceThresholds) -> Result<(), OrchestratorError> {
        *self.thresholds.lock().map_err(|e| {
            OrchestratorError::Infrastructure(format!("presence mutex poisoned: {e}"))
        })? = thresholds;
        Ok(())
    }

    /// Registers a verified connection in `scope`. If the user already held
    /// `scope` on another connection, that connection receives a
    /// `duplicate_connection` notice and is torn down.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Malformed` if the connection id is reused.
    pub fn connect(
        &self,
        identity: &VerifiedIdentity,
        connection_id: Uuid,
        scope: Scope,
    ) -> Result<JoinOutcome, OrchestratorError> {
        let now = self.clock.now();
        let outcome = self.registry()?.connect(identity, connection_id, scope, now)?;
        info!(user_id = %identity.user_id, %connection_id, ?scope, "session connected");
        self.notify_evicted(&outcome);
        Ok(outcome)
    }

    /// Joins an existing connection to another scope, with the same eviction
    /// rule as [`PresenceService::connect`].
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Malformed` if the connection is unknown.
    pub fn join(&self, connection_id: Uuid, scope: Scope) -> Result<JoinOutcome, OrchestratorError> {
        let now = self.clock.now();
        let outcome = self.registry()?.join(connection_id, scope, now)?;
        self.notify_evicted(&outcome);
        Ok(outcome)
    }

    /// Releases a scope.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Infrastructure` if the mutex is poisoned.
    pub fn leave(&self, connection_id: Uuid, scope: Scope) -> Result<bool, OrchestratorError> {
        Ok(self.registry()?.leave(connection_id, scope))
    }

    /// Records an activity signal.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::DuplicateSession` if the connection was
    /// superseded, or `OrchestratorError::Malformed` if it is unknown.
    pub fn touch(&self, connection_id: Uuid) -> Result<(), OrchestratorError> {
        let now = self.clock.now();
        let mut registry = self.registry()?;
        registry.require(connection_id)?;
        registry.touch(connection_id, now);
        Ok(())
    }

    /// Records a visibility change.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::DuplicateSession` if the connection was
    /// superseded, or `OrchestratorError::Malformed` if it is unknown.
    pub fn set_hidden(&self, connection_id: Uuid, hidden: bool) -> Result<(), OrchestratorError> {
        let now = self.clock.now();
        let mut registry = self.registry()?;
        registry.require(connection_id)?;
        registry.set_hidden(connection_id, hidden, now);
        Ok(())
    }

    /// Tears down a connection.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Infrastructure` if the mutex is poisoned.
    pub fn disconnect(&self, connection_id: Uuid) -> Result<Option<EndedSession>, OrchestratorError> {
        Ok(self.registry()?.disconnect(connection_id))
    }

    /// Disconnects every idle or long-hidden session and returns them so the
    /// caller can free their room slots.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Infrastructure` if a mutex is poisoned.
    pub fn sweep(&self) -> Result<Vec<EndedSession>, OrchestratorError> {
        let thresholds = *self.thresholds.lock().map_err(|e| {
            OrchestratorError::Infrastructure(format!("presence mutex poisoned: {e}"))
        })?;
        let now = self.clock.now();
        let ended =
            self.registry()?
                .sweep(now, thresholds.idle_timeout, thresholds.hidden_timeout);
        for session in &ended {
            warn!(
                user_id = %session.identity.user_id,
                connection_id = %session.identity.connection_id,
                reason = ?session.reason,
                "administrative disconnect"
            );
        }
        Ok(ended)
    }

    /// Looks up a session by connection.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Infrastructure` if the mutex is poisoned.
    pub fn session(&self, connection_id: Uuid) -> Result<Option<SessionIdentity>, OrchestratorError> {
        Ok(self.registry()?.get(connection_id).cloned())
    }

    /// Looks up a live session, distinguishing superseded connections from
    /// unknown ones.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::DuplicateSession` if the connection was
    /// superseded, or `OrchestratorError::Malformed` if it is unknown.
    pub fn require_session(&self, connection_id: Uuid) -> Result<SessionIdentity, OrchestratorError> {
        Ok(self.registry()?.require(connection_id)?.clone())
    }

    /// Verifies that `connection_id` is its user's authoritative connection
    /// for `scope` and returns the session.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::DuplicateSession` if the connection was
    /// superseded or another connection of the same user holds the scope,
    /// or `OrchestratorError::Malformed` if
    /// the connection is unknown.
    pub fn require_authoritative(
        &self,
        connection_id: Uuid,
        scope: Scope,
    ) -> Result<SessionIdentity, OrchestratorError> {
        let registry = self.registry()?;
        let session = registry.require(connection_id)?.clone();
        match registry.authoritative(&session.user_id, scope) {
            Some(holder) if holder != connection_id => Err(OrchestratorError::DuplicateSession {
                user_id: session.user_id,
            }),
            _ => Ok(session),
        }
    }

    /// Distinct users connected to the lobby.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Infrastructure` if the mutex is poisoned.
    pub fn online_users(&self) -> Result<usize, OrchestratorError> {
        Ok(self.registry()?.online_users())
    }

    fn notify_evicted(&self, outcome: &JoinOutcome) {
        if let JoinOutcome::Superseded { evicted } = outcome {
            let client_id = evicted.identity.connection_id;
            warn!(
                user_id = %evicted.identity.user_id,
                %client_id,
                "evicting older duplicate connection"
            );
            self.publisher.publish(
                Channel::Connection(client_id),
                OutboundEvent::DuplicateConnection(DuplicateConnectionPayload { client_id }),
            );
        }
    }
}
