//! Domain layer for the lobby context.

pub mod daily_limit;
