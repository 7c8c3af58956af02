//! Publish port to the real-time transport collaborator.

use uuid::Uuid;

use crate::event::OutboundEvent;

/// Where an outbound event is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Every client browsing the lobby.
    Lobby,
    /// Every client in one room.
    Room(Uuid),
    /// A single connection.
    Connection(Uuid),
}

/// Fire-and-forget publisher. Implementations must not block the caller;
/// a room's event loop publishes from inside its single-writer path.
pub trait Publisher: Send + Sync {
    /// Publishes `event` on `channel`.
    fn publish(&self, channel: Channel, event: OutboundEvent);
}

/// Publisher that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPublisher;

impl Publisher for NullPublisher {
    fn publish(&self, _channel: Channel, _event: OutboundEvent) {}
}
