//! Trivia — Lobby orchestration bounded context.
//!
//! Owns the room registry and routes every player-facing operation through
//! presence checks before it reaches a room.

pub mod application;
pub mod domain;
