//! Application layer for the room context.

pub mod persistence;
pub mod room_actor;
