//! Application layer for the Session Identity & Presence context.

pub mod presence_service;
