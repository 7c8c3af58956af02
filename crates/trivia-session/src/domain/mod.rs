//! Domain layer for the Session Identity & Presence context.

pub mod identity;
pub mod registry;
