//! The fixed wall-clock set grid.
//!
//! Sets start on boundaries aligned to the Unix epoch every `period`. Each
//! period begins with an active window; the join window for the next set
//! opens `join_lead` before its start.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use trivia_core::config::GameConfig;
use trivia_core::error::OrchestratorError;

/// Where the wall clock sits relative to the set grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPhase {
    /// Between the end of one active window and the next join window;
    /// joins are queued.
    BeforeJoin,
    /// The join window of the upcoming set is open.
    JoinOpen,
    /// A set is active.
    Active,
}

/// The set a given instant belongs to, and the phase within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBoundary {
    /// Start of the set (current when active, upcoming otherwise).
    pub set_start: DateTime<Utc>,
    /// End of that set's active window.
    pub set_end: DateTime<Utc>,
    /// When that set's join window opens.
    pub join_opens_at: DateTime<Utc>,
    /// Phase at the instant the boundary was computed.
    pub phase: WindowPhase,
}

impl SetBoundary {
    /// Whether a direct join is allowed in this phase.
    #[must_use]
    pub fn join_window_open(&self) -> bool {
        self.phase == WindowPhase::JoinOpen
    }

    /// Whether a queued join is allowed in this phase.
    #[must_use]
    pub fn queueing_allowed(&self) -> bool {
        self.phase == WindowPhase::BeforeJoin
    }
}

/// Fixed-cadence set grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetSchedule {
    period: TimeDelta,
    active_window: TimeDelta,
    join_lead: TimeDelta,
}

impl SetSchedule {
    /// Creates a grid.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Malformed` unless
    /// `0 < active_window <= period` and `0 <= join_lead <= period - active_window`.
    pub fn new(
        period: TimeDelta,
        active_window: TimeDelta,
        join_lead: TimeDelta,
    ) -> Result<Self, OrchestratorError> {
        if period <= TimeDelta::zero() || active_window <= TimeDelta::zero() {
            return Err(OrchestratorError::Malformed(
                "set period and active window must be positive".to_owned(),
            ));
        }
        if active_window > period {
            return Err(OrchestratorError::Malformed(
                "active window cannot exceed the set period".to_owned(),
            ));
        }
        if join_lead < TimeDelta::zero() || join_lead > period - active_window {
            return Err(OrchestratorError::Malformed(
                "join window must fit between active windows".to_owned(),
            ));
        }
        Ok(Self {
            period,
            active_window,
            join_lead,
        })
    }

    /// Builds a grid from configuration, clamping inconsistent values
    /// instead of failing.
    #[must_use]
    pub fn from_config(config: &GameConfig) -> Self {
        let period = TimeDelta::minutes(i64::from(config.set_period_minutes.max(1)));
        let active_window =
            TimeDelta::minutes(i64::from(config.active_window_minutes.max(1))).min(period);
        let join_lead =
            TimeDelta::seconds(i64::from(config.join_window_lead_seconds)).min(period - active_window);
        Self {
            period,
            active_window,
            join_lead,
        }
    }

    /// Period length.
    #[must_use]
    pub fn period(&self) -> TimeDelta {
        self.period
    }

    /// Start of the period containing `now`.
    #[must_use]
    pub fn period_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let period_ms = self.period.num_milliseconds();
        let floor_ms = now.timestamp_millis().div_euclid(period_ms) * period_ms;
        DateTime::from_timestamp_millis(floor_ms).unwrap_or(now)
    }

    /// The first aligned set start strictly after `now`.
    #[must_use]
    pub fn next_set_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.period_start(now) + self.period
    }

    /// Whether `now` falls inside an active window.
    #[must_use]
    pub fn is_set_active(&self, now: DateTime<Utc>) -> bool {
        now - self.period_start(now) < self.active_window
    }

    /// Computes the set boundary and phase for `now`.
    #[must_use]
    pub fn boundary_at(&self, now: DateTime<Utc>) -> SetBoundary {
        let current = self.period_start(now);
        if self.is_set_active(now) {
            return SetBoundary {
                set_start: current,
                set_end: current + self.active_window,
                join_opens_at: current - self.join_lead,
                phase: WindowPhase::Active,
            };
        }
        let set_start = current + self.period;
        let join_opens_at = set_start - self.join_lead;
        SetBoundary {
            set_start,
            set_end: set_start + self.active_window,
            join_opens_at,
            phase: if now >= join_opens_at {
                WindowPhase::JoinOpen
            } else {
                WindowPhase::BeforeJoin
            },
        }
    }

    /// The next instant after `now` at which the phase changes.
    #[must_use]
    pub fn next_change_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let boundary = self.boundary_at(now);
        match boundary.phase {
            WindowPhase::Active => boundary.set_end,
            WindowPhase::BeforeJoin => boundary.join_opens_at,
            WindowPhase::JoinOpen => boundary.set_start,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn schedule() -> SetSchedule {
        SetSchedule::new(
            TimeDelta::minutes(30),
            TimeDelta::minutes(20),
            TimeDelta::minutes(2),
        )
        .unwrap()
    }

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, hour, minute, second)
            .unwrap()
    }

    #[test]
    fn test_next_set_time_aligns_to_period_grid() {
        let schedule = schedule();

        assert_eq!(schedule.next_set_time(at(10, 7, 13)), at(10, 30, 0));
        assert_eq!(schedule.next_set_time(at(10, 30, 0)), at(11, 0, 0));
        assert_eq!(schedule.next_set_time(at(10, 59, 59)), at(11, 0, 0));
    }

    #[test]
    fn test_is_set_active_only_inside_active_window() {
        let schedule = schedule();

        assert!(schedule.is_set_active(at(10, 0, 0)));
        assert!(schedule.is_set_active(at(10, 19, 59)));
        assert!(!schedule.is_set_active(at(10, 20, 0)));
        assert!(!schedule.is_set_active(at(10, 29, 59)));
    }

    #[test]
    fn test_boundary_phases_across_one_period() {
        let schedule = schedule();

        let active = schedule.boundary_at(at(10, 5, 0));
        assert_eq!(active.phase, WindowPhase::Active);
        assert_eq!(active.set_start, at(10, 0, 0));
        assert_eq!(active.set_end, at(10, 20, 0));

        let before = schedule.boundary_at(at(10, 20, 0));
        assert_eq!(before.phase, WindowPhase::BeforeJoin);
        assert_eq!(before.set_start, at(10, 30, 0));
        assert_eq!(before.join_opens_at, at(10, 28, 0));

        let open = schedule.boundary_at(at(10, 28, 0));
        assert_eq!(open.phase, WindowPhase::JoinOpen);
        assert!(open.join_window_open());
        assert!(!open.queueing_allowed());
    }

    #[test]
    fn test_next_change_walks_phases_in_order() {
        let schedule = schedule();

        assert_eq!(schedule.next_change_after(at(10, 5, 0)), at(10, 20, 0));
        assert_eq!(schedule.next_change_after(at(10, 20, 0)), at(10, 28, 0));
        assert_eq!(schedule.next_change_after(at(10, 28, 0)), at(10, 30, 0));
    }

    #[test]
    fn test_new_rejects_join_lead_overlapping_active_window() {
        let result = SetSchedule::new(
            TimeDelta::minutes(30),
            TimeDelta::minutes(20),
            TimeDelta::minutes(11),
        );

        assert!(matches!(result, Err(OrchestratorError::Malformed(_))));
    }

    #[test]
    fn test_from_config_clamps_join_lead() {
        let config = GameConfig {
            set_period_minutes: 30,
            active_window_minutes: 29,
            join_window_lead_seconds: 600,
            ..GameConfig::default()
        };

        let schedule = SetSchedule::from_config(&config);

        let boundary = schedule.boundary_at(at(10, 29, 0));
        assert_eq!(boundary.phase, WindowPhase::JoinOpen);
        assert_eq!(boundary.join_opens_at, at(10, 29, 0));
    }
}
