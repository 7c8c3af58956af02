//! Trivia — Session Identity & Presence bounded context.
//!
//! Responsible for the one-authoritative-connection-per-identity rule,
//! duplicate eviction, and idle/hidden administrative disconnects.

pub mod application;
pub mod domain;
