//! Route modules organized by orchestrator surface.

pub mod admin;
pub mod health;
pub mod lobby;
pub mod rooms;
pub mod sessions;
