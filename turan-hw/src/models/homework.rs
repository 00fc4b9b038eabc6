//! Homework submission record and its lifecycle rules
//!
//! ```text
//! assigned ──► submitted ──► approved
//!                  │    └──► rejected ──► (new attempt) second_chance ──► submitted
//!                  └──► under_review ──► approved | rejected
//! ```
//!
//! `approved` is terminal. `rejected` is terminal once the attempt number
//! has reached the configured maximum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use turan_common::db::HomeworkStatus;

use crate::error::{HomeworkError, HwResult};

/// One student's attempt at one lesson's homework
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HomeworkSubmission {
    pub id: Uuid,
    pub lesson_id: Uuid,
    pub student_id: Uuid,
    pub status: HomeworkStatus,
    pub attempt_number: u32,
    /// Path of the stored audio, relative to the audio store root
    pub audio_path: Option<String>,
    pub audio_content_type: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub transcription: Option<String>,
    pub similarity_score: Option<f64>,
    pub is_similarity_passed: Option<bool>,
    pub teacher_feedback: String,
    /// Why the record fell back to manual review
    pub error_note: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub deadline: DateTime<Utc>,
    pub is_late: bool,
    pub coins_awarded: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Teacher decision on a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

impl ReviewDecision {
    pub fn status(&self) -> HomeworkStatus {
        match self {
            ReviewDecision::Approved => HomeworkStatus::Approved,
            ReviewDecision::Rejected => HomeworkStatus::Rejected,
        }
    }
}

/// What a manual review does to the record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    /// Move to `approved` and credit the reward (once)
    Approve,
    /// Move to `rejected`, coins cleared
    Reject,
    /// Already approved: record feedback and reviewer only
    Refresh,
}

impl HomeworkSubmission {
    /// Fresh record for a new attempt
    pub fn new_attempt(
        lesson_id: Uuid,
        student_id: Uuid,
        attempt_number: u32,
        status: HomeworkStatus,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            lesson_id,
            student_id,
            status,
            attempt_number,
            audio_path: None,
            audio_content_type: None,
            submitted_at: None,
            transcription: None,
            similarity_score: None,
            is_similarity_passed: None,
            teacher_feedback: String::new(),
            error_note: None,
            reviewed_by: None,
            reviewed_at: None,
            deadline,
            is_late: false,
            coins_awarded: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether audio may be accepted in the current state
    pub fn can_submit(&self) -> bool {
        matches!(
            self.status,
            HomeworkStatus::Assigned | HomeworkStatus::SecondChance
        )
    }

    /// No further transition is possible
    pub fn is_terminal(&self, max_attempts: u32) -> bool {
        match self.status {
            HomeworkStatus::Approved => true,
            HomeworkStatus::Rejected => self.attempt_number >= max_attempts,
            _ => false,
        }
    }

    /// Decide what a manual review does from the current state
    pub fn review_action(
        &self,
        decision: ReviewDecision,
        max_attempts: u32,
    ) -> HwResult<ReviewAction> {
        match (self.status, decision) {
            (HomeworkStatus::Approved, ReviewDecision::Approved) => Ok(ReviewAction::Refresh),
            (HomeworkStatus::Approved, ReviewDecision::Rejected) => {
                Err(HomeworkError::InvalidState(format!(
                    "Homework {} is already approved",
                    self.id
                )))
            }
            _ if self.is_terminal(max_attempts) => Err(HomeworkError::InvalidState(format!(
                "Homework {} is rejected with all {} attempts used",
                self.id, max_attempts
            ))),
            (_, ReviewDecision::Approved) => Ok(ReviewAction::Approve),
            (_, ReviewDecision::Rejected) => Ok(ReviewAction::Reject),
        }
    }

    /// Check that a retry attempt may be opened from this record
    pub fn ensure_second_chance_allowed(&self, max_attempts: u32) -> HwResult<()> {
        if self.status != HomeworkStatus::Rejected {
            return Err(HomeworkError::InvalidState(format!(
                "Second chance requires a rejected homework, {} is {}",
                self.id, self.status
            )));
        }
        if self.attempt_number >= max_attempts {
            return Err(HomeworkError::InvalidState(format!(
                "Homework {} has used all {} attempts",
                self.id, max_attempts
            )));
        }
        Ok(())
    }
}
