//! Application layer for the lobby context.

pub mod driver;
pub mod lobby;
