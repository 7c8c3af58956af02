//! Trivia Core — shared domain abstractions.
//!
//! This crate defines the fundamental traits and types that every part of
//! the session orchestrator depends on: time, randomness, configuration,
//! the error taxonomy, the wire events exchanged with the transport layer,
//! and the ports to the storage and publish collaborators. It contains no
//! infrastructure code.

pub mod backoff;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod model;
pub mod publisher;
pub mod repository;
pub mod rng;
