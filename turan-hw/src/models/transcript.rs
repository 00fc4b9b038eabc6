//! Transcript detail attached to a scored submission

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Transcription result stored one-to-one with a homework record
///
/// Re-scoring replaces the whole row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcript {
    pub homework_id: Uuid,
    pub raw_text: String,
    pub cleaned_text: String,
    /// Collaborator confidence in [0, 1]
    pub confidence: f64,
    pub language: String,
    pub processing_ms: u64,
    pub created_at: DateTime<Utc>,
}
