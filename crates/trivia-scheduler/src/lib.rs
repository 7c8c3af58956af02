//! Trivia — Room & Set Scheduling bounded context.
//!
//! Responsible for the wall-clock set grid, room sizing, pre-window join
//! queues, configuration caching and question sourcing.

pub mod application;
pub mod domain;
