//! Recording publisher — captures every outbound event for assertions.

use std::sync::Mutex;

use trivia_core::event::OutboundEvent;
use trivia_core::publisher::{Channel, Publisher};

/// A publisher that records every `(channel, event)` pair.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(Channel, OutboundEvent)>>,
}

impl RecordingPublisher {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of everything published so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn published(&self) -> Vec<(Channel, OutboundEvent)> {
        self.published.lock().unwrap().clone()
    }

    /// Returns the events published on `channel`.
    pub fn on_channel(&self, channel: Channel) -> Vec<OutboundEvent> {
        self.published()
            .into_iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, e)| e)
            .collect()
    }

    /// Counts the events with wire name `name` on `channel`.
    pub fn count(&self, channel: Channel, name: &str) -> usize {
        self.on_channel(channel)
            .iter()
            .filter(|e| e.name() == name)
            .count()
    }

    /// Returns the wire names published on `channel`, in order.
    pub fn names(&self, channel: Channel) -> Vec<&'static str> {
        self.on_channel(channel).iter().map(OutboundEvent::name).collect()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, channel: Channel, event: OutboundEvent) {
        self.published.lock().unwrap().push((channel, event));
    }
}
