//! Exponential backoff policy for retried collaborator calls.
//!
//! The policy is a plain value so its delays can be asserted directly; the
//! caller owns the retry loop and the sleeping.

use std::time::Duration;

use crate::rng::DeterministicRng;

/// Parameterized exponential backoff with bounded, symmetric jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Growth factor applied per attempt.
    pub multiplier: f64,
    /// Upper bound on any single delay.
    pub cap: Duration,
    /// Fraction of the delay randomized in either direction, in `[0.0, 1.0]`.
    pub jitter: f64,
    /// Attempts after which the caller gives up.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(250),
            multiplier: 2.0,
            cap: Duration::from_secs(30),
            jitter: 0.2,
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Returns the delay to wait before retry number `attempt` (zero-based).
    ///
    /// The un-jittered delay is `base * multiplier^attempt`, capped at `cap`.
    /// Jitter then scales it by a factor drawn from
    /// `[1 - jitter, 1 + jitter)`, and the result is capped again.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, rng: &mut dyn DeterministicRng) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let cap = self.cap.as_secs_f64();
        let raw = (self.base.as_secs_f64() * self.multiplier.powi(exponent)).min(cap);
        let jitter = self.jitter.clamp(0.0, 1.0);
        let factor = 1.0 - jitter + 2.0 * jitter * rng.next_f64();
        let jittered = (raw * factor).clamp(0.0, cap);
        Duration::try_from_secs_f64(jittered).unwrap_or(self.cap)
    }

    /// Returns `true` while another attempt is allowed.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
