//! Domain layer for the scheduling context.

pub mod allocation;
pub mod join_queue;
pub mod quiz_set;
pub mod schedule;
