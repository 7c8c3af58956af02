//! Latency-compensated buzzer arbitration.
//!
//! The first buzz of a question opens a short grace window. Every buzz
//! received inside it is buffered; when the window closes the buzz with the
//! lowest adjusted timestamp wins. Adjusted timestamps subtract half of the
//! measured round trip, capped so a client cannot buy priority by reporting
//! inflated latency. Equal adjusted timestamps go to the buzz received
//! first. Once committed, the winner never changes for that question.

use chrono::{DateTime, TimeDelta, Utc};

/// A buzz as received by the room.
#[derive(Debug, Clone, PartialEq)]
pub struct BuzzEvent {
    /// The buzzing player.
    pub player_id: String,
    /// Client-side press time, epoch milliseconds.
    pub raw_timestamp: i64,
    /// Measured round-trip latency, milliseconds.
    pub measured_latency: f64,
    /// Server receipt time.
    pub received_at: DateTime<Utc>,
}

impl BuzzEvent {
    /// `raw - min(latency, max_compensation) / 2`.
    #[must_use]
    pub fn adjusted_timestamp(&self, max_compensation_ms: f64) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let raw = self.raw_timestamp as f64;
        raw - self.measured_latency.min(max_compensation_ms) / 2.0
    }
}

/// The committed winner of one question.
#[derive(Debug, Clone, PartialEq)]
pub struct BuzzWinner {
    /// The winning player.
    pub player_id: String,
    /// Their adjusted timestamp.
    pub adjusted_timestamp: f64,
    /// Buzzes considered.
    pub contenders: usize,
}

/// Why a buzz was not buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuzzRejection {
    /// Received after the grace window closed.
    Late,
    /// The winner is already committed.
    AlreadyCommitted,
    /// The player already buzzed this question.
    AlreadyBuzzed,
}

impl BuzzRejection {
    /// Short label for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Late => "late",
            Self::AlreadyCommitted => "already_committed",
            Self::AlreadyBuzzed => "already_buzzed",
        }
    }
}

/// A buffered buzz.
#[derive(Debug, Clone, PartialEq)]
pub enum BuzzAccepted {
    /// First buzz of the question; the window closes at the given instant.
    OpenedWindow(DateTime<Utc>),
    /// Buffered into an already-open window.
    Buffered,
}

#[derive(Debug, Clone)]
struct Candidate {
    player_id: String,
    adjusted: f64,
    sequence: u64,
}

#[derive(Debug, Clone)]
enum ArbiterState {
    Idle,
    Collecting {
        closes_at: DateTime<Utc>,
        candidates: Vec<Candidate>,
    },
    Committed(BuzzWinner),
}

/// Per-question buzzer arbiter.
#[derive(Debug, Clone)]
pub struct BuzzerArbiter {
    grace: TimeDelta,
    max_compensation_ms: f64,
    next_sequence: u64,
    state: ArbiterState,
}

impl BuzzerArbiter {
    /// Creates an idle arbiter.
    #[must_use]
    pub fn new(grace: TimeDelta, max_compensation_ms: u64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let max_compensation_ms = max_compensation_ms as f64;
        Self {
            grace,
            max_compensation_ms,
            next_sequence: 0,
            state: ArbiterState::Idle,
        }
    }

    /// Offers a buzz to the arbiter.
    ///
    /// # Errors
    ///
    /// Returns the [`BuzzRejection`] when the buzz cannot be buffered.
    pub fn submit(&mut self, buzz: &BuzzEvent) -> Result<BuzzAccepted, BuzzRejection> {
        let sequence = self.next_sequence;
        let candidate = Candidate {
            player_id: buzz.player_id.clone(),
            adjusted: buzz.adjusted_timestamp(self.max_compensation_ms),
            sequence,
        };
        match &mut self.state {
            ArbiterState::Committed(_) => Err(BuzzRejection::AlreadyCommitted),
            ArbiterState::Idle => {
                let closes_at = buzz.received_at + self.grace;
                self.state = ArbiterState::Collecting {
                    closes_at,
                    candidates: vec![candidate],
                };
                self.next_sequence += 1;
                Ok(BuzzAccepted::OpenedWindow(closes_at))
            }
            ArbiterState::Collecting {
                closes_at,
                candidates,
            } => {
                if buzz.received_at > *closes_at {
                    return Err(BuzzRejection::Late);
                }
                if candidates.iter().any(|c| c.player_id == buzz.player_id) {
                    return Err(BuzzRejection::AlreadyBuzzed);
                }
                candidates.push(candidate);
                self.next_sequence += 1;
                Ok(BuzzAccepted::Buffered)
            }
        }
    }

    /// When the open grace window closes.
    #[must_use]
    pub fn grace_deadline(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            ArbiterState::Collecting { closes_at, .. } => Some(*closes_at),
            _ => None,
        }
    }

    /// Whether a grace window is open.
    #[must_use]
    pub fn is_collecting(&self) -> bool {
        matches!(self.state, ArbiterState::Collecting { .. })
    }

    /// Commits the winner if the grace window has closed by `now`. Returns
    /// the winner only on the call that commits it.
    pub fn resolve_due(&mut self, now: DateTime<Utc>) -> Option<BuzzWinner> {
        let ArbiterState::Collecting {
            closes_at,
            candidates,
        } = &self.state
        else {
            return None;
        };
        if now < *closes_at {
            return None;
        }
        let best = candidates.iter().min_by(|a, b| {
            a.adjusted
                .total_cmp(&b.adjusted)
                .then(a.sequence.cmp(&b.sequence))
        })?;
        let winner = BuzzWinner {
            player_id: best.player_id.clone(),
            adjusted_timestamp: best.adjusted,
            contenders: candidates.len(),
        };
        self.state = ArbiterState::Committed(winner.clone());
        Some(winner)
    }

    /// Drops `player_id`'s buffered buzz, if any. A window left with no
    /// contenders closes so the next buzz opens a fresh one.
    pub fn withdraw(&mut self, player_id: &str) -> bool {
        let ArbiterState::Collecting { candidates, .. } = &mut self.state else {
            return false;
        };
        let before = candidates.len();
        candidates.retain(|c| c.player_id != player_id);
        let withdrawn = candidates.len() != before;
        if candidates.is_empty() {
            self.state = ArbiterState::Idle;
        }
        withdrawn
    }

    /// The committed winner, if any.
    #[must_use]
    pub fn winner(&self) -> Option<&BuzzWinner> {
        match &self.state {
            ArbiterState::Committed(winner) => Some(winner),
            _ => None,
        }
    }

    /// Discards all state for the next question.
    pub fn reset(&mut self) {
        self.state = ArbiterState::Idle;
        self.next_sequence = 0;
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    fn buzz(player: &str, raw: i64, latency: f64, offset_ms: i64) -> BuzzEvent {
        BuzzEvent {
            player_id: player.to_owned(),
            raw_timestamp: raw,
            measured_latency: latency,
            received_at: t0() + TimeDelta::milliseconds(offset_ms),
        }
    }

    fn arbiter() -> BuzzerArbiter {
        BuzzerArbiter::new(TimeDelta::milliseconds(150), 1000)
    }

    #[test]
    fn test_higher_latency_player_wins_after_compensation() {
        // Arrange: A presses at 1000 with 200 ms RTT, B at 1050 with 20 ms.
        let mut arbiter = arbiter();
        arbiter.submit(&buzz("a", 1000, 200.0, 0)).unwrap();
        arbiter.submit(&buzz("b", 1050, 20.0, 20)).unwrap();

        // Act
        let winner = arbiter.resolve_due(t0() + TimeDelta::milliseconds(150));

        // Assert: 900 beats 1040.
        let winner = winner.unwrap();
        assert_eq!(winner.player_id, "a");
        assert!((winner.adjusted_timestamp - 900.0).abs() < f64::EPSILON);
        assert_eq!(winner.contenders, 2);
    }

    #[test]
    fn test_late_arrival_inside_grace_window_can_still_win() {
        let mut arbiter = arbiter();
        arbiter.submit(&buzz("fast-network", 1100, 10.0, 0)).unwrap();
        arbiter.submit(&buzz("slow-network", 1000, 300.0, 140)).unwrap();

        let winner = arbiter
            .resolve_due(t0() + TimeDelta::milliseconds(150))
            .unwrap();

        assert_eq!(winner.player_id, "slow-network");
    }

    #[test]
    fn test_buzz_after_grace_window_is_late() {
        let mut arbiter = arbiter();
        arbiter.submit(&buzz("a", 1000, 0.0, 0)).unwrap();

        let result = arbiter.submit(&buzz("b", 500, 0.0, 151));

        assert_eq!(result, Err(BuzzRejection::Late));
    }

    #[test]
    fn test_equal_adjusted_timestamps_go_to_first_received() {
        let mut arbiter = arbiter();
        arbiter.submit(&buzz("first", 1000, 100.0, 0)).unwrap();
        arbiter.submit(&buzz("second", 1040, 180.0, 5)).unwrap();

        let winner = arbiter
            .resolve_due(t0() + TimeDelta::milliseconds(150))
            .unwrap();

        assert_eq!(winner.player_id, "first");
    }

    #[test]
    fn test_compensation_is_capped() {
        let mut arbiter = arbiter();
        arbiter.submit(&buzz("honest", 1000, 100.0, 0)).unwrap();
        arbiter.submit(&buzz("inflated", 1500, 50_000.0, 10)).unwrap();

        let winner = arbiter
            .resolve_due(t0() + TimeDelta::milliseconds(150))
            .unwrap();

        // 950 beats 1500 - 1000 / 2.
        assert_eq!(winner.player_id, "honest");
    }

    #[test]
    fn test_committed_winner_is_immutable() {
        // Arrange
        let mut arbiter = arbiter();
        arbiter.submit(&buzz("a", 1000, 0.0, 0)).unwrap();
        arbiter.resolve_due(t0() + TimeDelta::milliseconds(150));

        // Act
        let rejected = arbiter.submit(&buzz("b", 1, 0.0, 151));
        let second_resolve = arbiter.resolve_due(t0() + TimeDelta::seconds(5));

        // Assert
        assert_eq!(rejected, Err(BuzzRejection::AlreadyCommitted));
        assert!(second_resolve.is_none());
        assert_eq!(arbiter.winner().unwrap().player_id, "a");
    }

    #[test]
    fn test_repeat_buzz_from_same_player_is_ignored() {
        let mut arbiter = arbiter();
        arbiter.submit(&buzz("a", 1000, 0.0, 0)).unwrap();

        let result = arbiter.submit(&buzz("a", 900, 0.0, 10));

        assert_eq!(result, Err(BuzzRejection::AlreadyBuzzed));
    }

    #[test]
    fn test_withdrawn_buzz_cannot_win() {
        // Arrange
        let mut arbiter = arbiter();
        arbiter.submit(&buzz("a", 1000, 0.0, 0)).unwrap();
        arbiter.submit(&buzz("b", 1010, 0.0, 10)).unwrap();

        // Act
        let withdrawn = arbiter.withdraw("a");
        let winner = arbiter
            .resolve_due(t0() + TimeDelta::milliseconds(150))
            .unwrap();

        // Assert
        assert!(withdrawn);
        assert_eq!(winner.player_id, "b");
        assert_eq!(winner.contenders, 1);
    }

    #[test]
    fn test_withdrawing_the_only_contender_reopens_the_buzzer() {
        let mut arbiter = arbiter();
        arbiter.submit(&buzz("a", 1000, 0.0, 0)).unwrap();

        arbiter.withdraw("a");
        let next = arbiter.submit(&buzz("b", 1200, 0.0, 200));

        assert!(!arbiter.withdraw("nobody"));
        assert!(matches!(next, Ok(BuzzAccepted::OpenedWindow(_))));
    }

    #[test]
    fn test_resolve_before_window_closes_is_a_no_op() {
        let mut arbiter = arbiter();
        arbiter.submit(&buzz("a", 1000, 0.0, 0)).unwrap();

        assert!(arbiter.resolve_due(t0() + TimeDelta::milliseconds(149)).is_none());
        assert!(arbiter.is_collecting());
    }
}
