//! In-process fan-out of outbound events to the transport front end.

use tokio::sync::broadcast;
use tracing::trace;
use trivia_core::event::OutboundEvent;
use trivia_core::publisher::{Channel, Publisher};

/// One published event.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    /// Delivery channel.
    pub channel: Channel,
    /// The event.
    pub event: OutboundEvent,
}

/// Publisher backed by a `broadcast` channel. Subscribers that fall behind
/// lose the oldest events rather than slowing a room down.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<Published>,
}

impl BroadcastPublisher {
    /// Creates a publisher buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Attaches a new subscriber.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Published> {
        self.tx.subscribe()
    }
}

impl Publisher for BroadcastPublisher {
    fn publish(&self, channel: Channel, event: OutboundEvent) {
        let name = event.name();
        if self.tx.send(Published { channel, event }).is_err() {
            trace!(?channel, event = name, "no transport subscriber");
        }
    }
}
