//! Application layer for the scheduling context.

pub mod config_provider;
pub mod question_source;
pub mod set_clock;
