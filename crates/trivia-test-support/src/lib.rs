//! Shared test mocks and utilities for the trivia session orchestrator.

mod clock;
mod publisher;
mod repository;
mod rng;

pub use clock::{FixedClock, ManualClock, TokioClock};
pub use publisher::RecordingPublisher;
pub use repository::{InMemoryStorage, sample_question, sample_questions};
pub use rng::{MockRng, SequenceRng};
