//! Free-tier daily set allowance.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use uuid::Uuid;

/// Counts the distinct sets each user entered on a UTC day.
///
/// Re-entering a set already counted today is always allowed, so a player
/// who drops and rejoins does not burn a second entry.
#[derive(Debug, Default)]
pub struct DailyLimiter {
    entries: HashMap<String, (NaiveDate, HashSet<Uuid>)>,
}

impl DailyLimiter {
    /// Creates an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `user_id` may enter `set_id` on `today` under `limit`.
    #[must_use]
    pub fn allows(&self, user_id: &str, set_id: Uuid, today: NaiveDate, limit: u32) -> bool {
        match self.entries.get(user_id) {
            Some((day, sets)) if *day == today => {
                sets.contains(&set_id) || sets.len() < limit as usize
            }
            _ => limit > 0,
        }
    }

    /// Records that `user_id` entered `set_id` on `today`.
    pub fn record(&mut self, user_id: &str, set_id: Uuid, today: NaiveDate) {
        let entry = self
            .entries
            .entry(user_id.to_owned())
            .or_insert_with(|| (today, HashSet::new()));
        if entry.0 != today {
            *entry = (today, HashSet::new());
        }
        entry.1.insert(set_id);
    }

    /// Sets entered today.
    #[must_use]
    pub fn used(&self, user_id: &str, today: NaiveDate) -> usize {
        match self.entries.get(user_id) {
            Some((day, sets)) if *day == today => sets.len(),
            _ => 0,
        }
    }
}
