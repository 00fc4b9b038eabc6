//! Asynchronous scoring of submitted homework

pub mod queue;
pub mod similarity;
pub mod transcriber;
pub mod worker;

pub use queue::{scoring_channel, ClaimSet, ScoringJob, ScoringQueue};
pub use similarity::{clean_transcript, similarity};
pub use transcriber::{HttpTranscriber, Transcriber, TranscriptionResult, UnconfiguredTranscriber};
pub use worker::{ScoringOutcome, ScoringWorker, WorkerPool};
