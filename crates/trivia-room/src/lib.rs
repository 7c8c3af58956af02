//! Trivia — Room Game Loop bounded context.
//!
//! Each room is a single-writer state machine driven by one tokio task:
//! countdown, open buzzer, answer window, results, and set end. The buzzer
//! arbiter, score ledger and badge evaluator live inside the machine and
//! are only ever touched from that task.

pub mod application;
pub mod domain;
