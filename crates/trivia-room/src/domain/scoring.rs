//! Idempotent score application and leaderboard ranking.

use std::cmp::Ordering;
use std::collections::HashSet;

use trivia_core::config::{DifficultyPoints, TieBreak};
use trivia_core::event::{LeaderboardEntry, ScoreEntry};
use trivia_core::model::Difficulty;
use uuid::Uuid;

use super::player::{Player, Roster};

/// One scoring event, keyed for idempotence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringEvent {
    /// Idempotency key.
    pub event_id: Uuid,
    /// Scored player.
    pub player_id: String,
    /// Points to apply.
    pub points: i64,
    /// Whether the answer was correct.
    pub correct: bool,
}

/// Result of offering a scoring event to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreOutcome {
    /// Applied; carries the new score.
    Applied(i64),
    /// Already applied earlier; nothing changed.
    Duplicate,
    /// The player is not seated.
    UnknownPlayer,
}

/// Points for an answer at `difficulty`.
#[must_use]
pub fn points_for(table: &DifficultyPoints, difficulty: Difficulty, correct: bool) -> i64 {
    let values = table.for_difficulty(difficulty);
    if correct { values.correct } else { values.wrong }
}

/// Tracks which scoring events were applied during the current set.
#[derive(Debug, Default)]
pub struct ScoreLedger {
    applied: HashSet<Uuid>,
}

impl ScoreLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `event` to the roster exactly once.
    pub fn apply(&mut self, roster: &mut Roster, event: &ScoringEvent) -> ScoreOutcome {
        if self.applied.contains(&event.event_id) {
            return ScoreOutcome::Duplicate;
        }
        let Some(player) = roster.get_mut(&event.player_id) else {
            return ScoreOutcome::UnknownPlayer;
        };
        self.applied.insert(event.event_id);
        player.score += event.points;
        if event.correct {
            player.correct_count += 1;
            player.streak += 1;
            player.lifetime_correct = player.lifetime_correct.saturating_add(1);
        } else {
            player.wrong_count += 1;
            player.streak = 0;
        }
        ScoreOutcome::Applied(player.score)
    }

    /// Forgets applied events at a set boundary.
    pub fn reset(&mut self) {
        self.applied.clear();
    }
}

fn compare(a: &Player, b: &Player, tie_break: TieBreak) -> Ordering {
    let by_score = b.score.cmp(&a.score);
    let tie = match tie_break {
        TieBreak::CorrectCountThenUserId => b
            .correct_count
            .cmp(&a.correct_count)
            .then(a.wrong_count.cmp(&b.wrong_count)),
        TieBreak::EarliestJoinThenUserId => a.joined_at.cmp(&b.joined_at),
        TieBreak::UserId => Ordering::Equal,
    };
    by_score.then(tie).then_with(|| a.id.cmp(&b.id))
}

fn tie_break_key(player: &Player, tie_break: TieBreak) -> String {
    match tie_break {
        TieBreak::CorrectCountThenUserId => format!(
            "correct={};wrong={};id={}",
            player.correct_count, player.wrong_count, player.id
        ),
        TieBreak::EarliestJoinThenUserId => format!(
            "joined={};id={}",
            player.joined_at.timestamp_millis(),
            player.id
        ),
        TieBreak::UserId => format!("id={}", player.id),
    }
}

fn ranked<'a>(players: impl Iterator<Item = &'a Player>, tie_break: TieBreak) -> Vec<&'a Player> {
    let mut players: Vec<&Player> = players.collect();
    players.sort_by(|a, b| compare(a, b, tie_break));
    players
}

/// Score rows in leaderboard order.
#[must_use]
pub fn ranked_scores<'a>(
    players: impl Iterator<Item = &'a Player>,
    tie_break: TieBreak,
) -> Vec<ScoreEntry> {
    ranked(players, tie_break)
        .into_iter()
        .map(Player::score_entry)
        .collect()
}

/// Ranked leaderboard. Ranks are distinct: ties are fully resolved by the
/// policy, falling back to user id.
#[must_use]
pub fn leaderboard<'a>(
    players: impl Iterator<Item = &'a Player>,
    tie_break: TieBreak,
) -> Vec<LeaderboardEntry> {
    ranked(players, tie_break)
        .into_iter()
        .zip(1u32..)
        .map(|(player, rank)| LeaderboardEntry {
            rank,
            user_id: player.id.clone(),
            display_name: player.display_name.clone(),
            score: player.score,
            tie_break_key: tie_break_key(player, tie_break),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone, Utc};
    use trivia_scheduler::domain::join_queue::JoinRequest;

    use super::*;

    fn seat(roster: &mut Roster, user_id: &str, offset_s: i64) {
        let request = JoinRequest {
            user_id: user_id.to_owned(),
            display_name: user_id.to_uppercase(),
            is_ai: false,
            connection_id: None,
        };
        let at = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
            + TimeDelta::seconds(offset_s);
        roster.insert(Player::new(&request, at));
    }

    fn event(player: &str, points: i64, correct: bool) -> ScoringEvent {
        ScoringEvent {
            event_id: Uuid::new_v4(),
            player_id: player.to_owned(),
            points,
            correct,
        }
    }

    #[test]
    fn test_redelivered_event_is_applied_once() {
        // Arrange
        let mut roster = Roster::new();
        seat(&mut roster, "a", 0);
        let mut ledger = ScoreLedger::new();
        let scoring = event("a", 20, true);

        // Act
        let first = ledger.apply(&mut roster, &scoring);
        let second = ledger.apply(&mut roster, &scoring);

        // Assert
        assert_eq!(first, ScoreOutcome::Applied(20));
        assert_eq!(second, ScoreOutcome::Duplicate);
        let player = roster.get("a").unwrap();
        assert_eq!((player.score, player.correct_count, player.streak), (20, 1, 1));
    }

    #[test]
    fn test_wrong_answer_resets_streak_and_can_go_negative() {
        let mut roster = Roster::new();
        seat(&mut roster, "a", 0);
        let mut ledger = ScoreLedger::new();

        ledger.apply(&mut roster, &event("a", 10, true));
        ledger.apply(&mut roster, &event("a", -15, false));

        let player = roster.get("a").unwrap();
        assert_eq!(player.score, -5);
        assert_eq!(player.streak, 0);
        assert_eq!(player.wrong_count, 1);
    }

    #[test]
    fn test_unknown_player_is_not_recorded_as_applied() {
        let mut roster = Roster::new();
        let mut ledger = ScoreLedger::new();
        let scoring = event("ghost", 10, true);

        assert_eq!(ledger.apply(&mut roster, &scoring), ScoreOutcome::UnknownPlayer);
        seat(&mut roster, "ghost", 0);
        assert_eq!(ledger.apply(&mut roster, &scoring), ScoreOutcome::Applied(10));
    }

    #[test]
    fn test_points_follow_difficulty_table() {
        let table = DifficultyPoints::default();

        assert_eq!(points_for(&table, Difficulty::Medium, true), 20);
        assert_eq!(points_for(&table, Difficulty::Hard, false), -15);
    }

    #[test]
    fn test_leaderboard_breaks_ties_by_correct_count_then_user_id() {
        // Arrange
        let mut roster = Roster::new();
        for id in ["carol", "bob", "alice"] {
            seat(&mut roster, id, 0);
        }
        let mut ledger = ScoreLedger::new();
        ledger.apply(&mut roster, &event("carol", 20, true));
        ledger.apply(&mut roster, &event("bob", 30, true));
        ledger.apply(&mut roster, &event("bob", -10, false));
        ledger.apply(&mut roster, &event("alice", 20, true));

        // Act
        let board = leaderboard(roster.active(), TieBreak::CorrectCountThenUserId);

        // Assert: all on 20; bob has a wrong answer, alice < carol by id.
        let order: Vec<&str> = board.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(order, vec!["alice", "carol", "bob"]);
        let ranks: Vec<u32> = board.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_leaderboard_earliest_join_policy() {
        let mut roster = Roster::new();
        seat(&mut roster, "late", 30);
        seat(&mut roster, "early", 0);

        let board = leaderboard(roster.active(), TieBreak::EarliestJoinThenUserId);

        assert_eq!(board[0].user_id, "early");
        assert!(board[0].tie_break_key.starts_with("joined="));
    }
}
