//! Domain layer for the room context.

pub mod badges;
pub mod buzzer;
pub mod machine;
pub mod player;
pub mod scoring;
