//! The set boundary clock: the single authority that recomputes the set
//! grid position and broadcasts it to every room.
//!
//! Rooms only ever hold a `watch::Receiver`; nothing but this type writes
//! the boundary.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;
use trivia_core::clock::Clock;

use crate::domain::schedule::{SetBoundary, SetSchedule};

/// A phase change observed by [`SetClock::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    /// Boundary before the tick.
    pub from: SetBoundary,
    /// Boundary after the tick.
    pub to: SetBoundary,
}

/// Single-writer owner of the current [`SetBoundary`].
pub struct SetClock {
    schedule: SetSchedule,
    clock: Arc<dyn Clock>,
    tx: watch::Sender<SetBoundary>,
}

impl std::fmt::Debug for SetClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetClock")
            .field("schedule", &self.schedule)
            .field("boundary", &*self.tx.borrow())
            .finish_non_exhaustive()
    }
}

impl SetClock {
    /// Creates the authority, seeded with the boundary for the current time.
    #[must_use]
    pub fn new(schedule: SetSchedule, clock: Arc<dyn Clock>) -> Self {
        let (tx, _rx) = watch::channel(schedule.boundary_at(clock.now()));
        Self {
            schedule,
            clock,
            tx,
        }
    }

    /// The grid this clock follows.
    #[must_use]
    pub fn schedule(&self) -> SetSchedule {
        self.schedule
    }

    /// A read-only view of the boundary for one room.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SetBoundary> {
        self.tx.subscribe()
    }

    /// The last broadcast boundary.
    #[must_use]
    pub fn current(&self) -> SetBoundary {
        *self.tx.borrow()
    }

    /// Recomputes the boundary from the clock and broadcasts it if the phase
    /// or set changed.
    pub fn tick(&self) -> Option<PhaseChange> {
        let next = self.schedule.boundary_at(self.clock.now());
        let mut change = None;
        self.tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            change = Some(PhaseChange {
                from: *current,
                to: next,
            });
            *current = next;
            true
        });
        if let Some(change) = &change {
            info!(
                from = ?change.from.phase,
                to = ?change.to.phase,
                set_start = %change.to.set_start,
                "set boundary advanced"
            );
        }
        change
    }

    /// Time until the next phase change.
    #[must_use]
    pub fn until_next_change(&self) -> Duration {
        let now = self.clock.now();
        (self.schedule.next_change_after(now) - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone, Utc};
    use trivia_test_support::ManualClock;

    use super::*;
    use crate::domain::schedule::WindowPhase;

    #[test]
    fn test_tick_broadcasts_only_on_phase_change() {
        // Arrange
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 25, 0).unwrap(),
        ));
        let schedule = SetSchedule::new(
            TimeDelta::minutes(30),
            TimeDelta::minutes(20),
            TimeDelta::minutes(2),
        )
        .unwrap();
        let set_clock = SetClock::new(schedule, clock.clone());
        let mut rx = set_clock.subscribe();

        // Act
        clock.advance(TimeDelta::minutes(1));
        let unchanged = set_clock.tick();
        clock.advance(TimeDelta::minutes(2));
        let changed = set_clock.tick();

        // Assert
        assert!(unchanged.is_none());
        let change = changed.unwrap();
        assert_eq!(change.from.phase, WindowPhase::BeforeJoin);
        assert_eq!(change.to.phase, WindowPhase::JoinOpen);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().phase, WindowPhase::JoinOpen);
    }

    #[test]
    fn test_until_next_change_counts_down_to_join_window() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 25, 0).unwrap(),
        ));
        let set_clock = SetClock::new(
            SetSchedule::new(
                TimeDelta::minutes(30),
                TimeDelta::minutes(20),
                TimeDelta::minutes(2),
            )
            .unwrap(),
            clock,
        );

        assert_eq!(set_clock.until_next_change(), Duration::from_secs(180));
    }
}
