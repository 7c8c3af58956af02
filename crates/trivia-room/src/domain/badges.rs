//! Badge catalog and per-set evaluation.
//!
//! Badges are grouped; within a group the first rule that matches wins, so
//! groups list their highest tier first. One-time badges are granted once
//! per account, repeatable badges every time their rule matches.

use std::collections::BTreeMap;

use chrono::TimeDelta;
use trivia_core::event::{BadgeSummaryEntry, EarnedBadge};

use super::player::Player;

/// When a badge is granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeRule {
    /// Correct-answer streak has reached at least this length.
    StreakReached(u32),
    /// Correct-answer streak is a positive multiple of this length.
    StreakMultiple(u32),
    /// Lifetime correct answers have reached at least this total.
    LifetimeCorrect(u32),
    /// Correct answer submitted within this long of winning the buzzer.
    AnsweredWithin(TimeDelta),
}

/// One badge in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeDefinition {
    /// Stable identifier.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Bonus skill points.
    pub skill_points: u32,
    /// Whether the badge can be granted more than once.
    pub repeatable: bool,
    /// Grant condition.
    pub rule: BadgeRule,
}

/// An ordered group of mutually exclusive badges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeGroup {
    /// Group name.
    pub name: &'static str,
    /// Badges, highest tier first.
    pub badges: Vec<BadgeDefinition>,
}

/// The full badge catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeCatalog {
    /// Groups, evaluated independently.
    pub groups: Vec<BadgeGroup>,
}

impl Default for BadgeCatalog {
    fn default() -> Self {
        Self {
            groups: vec![
                BadgeGroup {
                    name: "streak",
                    badges: vec![
                        BadgeDefinition {
                            id: "on_fire_5",
                            name: "On Fire",
                            skill_points: 50,
                            repeatable: false,
                            rule: BadgeRule::StreakReached(5),
                        },
                        BadgeDefinition {
                            id: "hot_streak_3",
                            name: "Hot Streak",
                            skill_points: 15,
                            repeatable: true,
                            rule: BadgeRule::StreakMultiple(3),
                        },
                    ],
                },
                BadgeGroup {
                    name: "speed",
                    badges: vec![BadgeDefinition {
                        id: "quick_draw",
                        name: "Quick Draw",
                        skill_points: 10,
                        repeatable: true,
                        rule: BadgeRule::AnsweredWithin(TimeDelta::seconds(2)),
                    }],
                },
                BadgeGroup {
                    name: "milestone",
                    badges: vec![
                        BadgeDefinition {
                            id: "sharpshooter_25",
                            name: "Sharpshooter",
                            skill_points: 100,
                            repeatable: false,
                            rule: BadgeRule::LifetimeCorrect(25),
                        },
                        BadgeDefinition {
                            id: "first_correct",
                            name: "First Blood",
                            skill_points: 5,
                            repeatable: false,
                            rule: BadgeRule::LifetimeCorrect(1),
                        },
                    ],
                },
            ],
        }
    }
}

/// Facts about the answer being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerContext {
    /// Whether the answer was correct.
    pub correct: bool,
    /// Time from winning the buzzer to answering.
    pub answer_elapsed: TimeDelta,
}

fn matches(rule: BadgeRule, player: &Player, context: &AnswerContext) -> bool {
    if !context.correct {
        return false;
    }
    match rule {
        BadgeRule::StreakReached(n) => player.streak >= n,
        BadgeRule::StreakMultiple(n) => n > 0 && player.streak > 0 && player.streak % n == 0,
        BadgeRule::LifetimeCorrect(n) => player.lifetime_correct >= n,
        BadgeRule::AnsweredWithin(limit) => context.answer_elapsed <= limit,
    }
}

/// Evaluates the catalog after each applied score and tallies grants for
/// the set summary.
#[derive(Debug, Default)]
pub struct BadgeEvaluator {
    catalog: BadgeCatalog,
    tally: BTreeMap<(String, &'static str), (u32, u32)>,
}

impl BadgeEvaluator {
    /// Creates an evaluator over `catalog`.
    #[must_use]
    pub fn new(catalog: BadgeCatalog) -> Self {
        Self {
            catalog,
            tally: BTreeMap::new(),
        }
    }

    /// Evaluates every group against `player`'s refreshed statistics.
    /// One-time grants are recorded on the player.
    pub fn evaluate(&mut self, player: &mut Player, context: &AnswerContext) -> Vec<EarnedBadge> {
        let mut earned = Vec::new();
        for group in &self.catalog.groups {
            let granted = group.badges.iter().find(|badge| {
                (badge.repeatable || !player.held_badges.contains(badge.id))
                    && matches(badge.rule, player, context)
            });
            let Some(badge) = granted else {
                continue;
            };
            if !badge.repeatable {
                player.held_badges.insert(badge.id.to_owned());
            }
            let entry = self
                .tally
                .entry((player.id.clone(), badge.id))
                .or_insert((0, 0));
            entry.0 += 1;
            entry.1 += badge.skill_points;
            earned.push(EarnedBadge {
                user_id: player.id.clone(),
                badge_id: badge.id.to_owned(),
                name: badge.name.to_owned(),
                skill_points: badge.skill_points,
            });
        }
        earned
    }

    /// Grants this set, ordered by user then badge.
    #[must_use]
    pub fn summary(&self) -> Vec<BadgeSummaryEntry> {
        self.tally
            .iter()
            .map(|((user_id, badge_id), (count, skill_points))| BadgeSummaryEntry {
                user_id: user_id.clone(),
                badge_id: (*badge_id).to_owned(),
                count: *count,
                skill_points: *skill_points,
            })
            .collect()
    }

    /// Clears the set tally.
    pub fn reset(&mut self) {
        self.tally.clear();
    }
}
