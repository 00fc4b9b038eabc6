//! Submission intake
//!
//! Accepts audio for an open homework record, moves it to `submitted` and
//! queues it for scoring. The guarded status UPDATE is the only protection
//! against double submission: whichever request changes the row wins, and
//! the loser's stored audio is removed.

use sqlx::SqlitePool;
use tracing::{error, info, warn};
use uuid::Uuid;

use turan_common::db::HomeworkStatus;
use turan_common::events::{EventBus, TuranEvent};
use turan_common::time;

use crate::config::SettingsHandle;
use crate::db::homeworks::{self as homeworks_db, SubmissionUpdate};
use crate::error::{HomeworkError, HwResult};
use crate::models::HomeworkSubmission;
use crate::services::audio_store::AudioStore;
use crate::services::authz::Caller;
use crate::services::scoring::ScoringQueue;
use crate::utils::retry_on_lock;

const LOCK_WAIT_MS: u64 = 5000;

/// Submission intake service
pub struct SubmissionIntake {
    db: SqlitePool,
    settings: SettingsHandle,
    audio: AudioStore,
    queue: ScoringQueue,
    events: EventBus,
}

impl SubmissionIntake {
    pub fn new(
        db: SqlitePool,
        settings: SettingsHandle,
        audio: AudioStore,
        queue: ScoringQueue,
        events: EventBus,
    ) -> Self {
        Self {
            db,
            settings,
            audio,
            queue,
            events,
        }
    }

    /// Accept `audio` from the owning student
    pub async fn submit(
        &self,
        caller: &Caller,
        homework_id: Uuid,
        content_type: &str,
        audio: &[u8],
    ) -> HwResult<HomeworkSubmission> {
        let hw = homeworks_db::load_homework(&self.db, homework_id)
            .await?
            .filter(|hw| hw.student_id == caller.user_id)
            .ok_or_else(|| HomeworkError::NotFound(format!("Homework {}", homework_id)))?;

        if !hw.can_submit() {
            return Err(HomeworkError::InvalidState(format!(
                "Homework {} is {} and cannot accept a submission",
                homework_id, hw.status
            )));
        }

        let settings = self.settings.current();
        if !settings.accepts_format(content_type) {
            return Err(HomeworkError::Validation(format!(
                "Unsupported audio format '{}', expected one of: {}",
                content_type,
                settings.supported_audio_formats.join(", ")
            )));
        }
        if audio.is_empty() {
            return Err(HomeworkError::Validation("Audio payload is empty".to_string()));
        }
        if audio.len() as u64 > settings.max_audio_bytes() {
            return Err(HomeworkError::Validation(format!(
                "Audio is {} bytes, limit is {} MB",
                audio.len(),
                settings.max_audio_file_size_mb
            )));
        }

        let now = time::now();
        let audio_path = self.audio.save(homework_id, content_type, audio, now).await?;
        let update = SubmissionUpdate {
            audio_path: &audio_path,
            content_type,
            submitted_at: now,
            is_late: now > hw.deadline,
        };

        let student_id = caller.user_id;
        let update_ref = &update;
        let updated = retry_on_lock("homework submit", LOCK_WAIT_MS, move || async move {
            Ok(homeworks_db::mark_submitted(&self.db, homework_id, student_id, update_ref).await?)
        })
        .await;

        match updated {
            Ok(true) => {}
            Ok(false) => {
                self.discard_audio(&audio_path).await;
                return Err(HomeworkError::InvalidState(format!(
                    "Homework {} was already submitted",
                    homework_id
                )));
            }
            Err(e) => {
                self.discard_audio(&audio_path).await;
                return Err(e);
            }
        }

        info!(
            homework_id = %homework_id,
            student_id = %student_id,
            attempt = hw.attempt_number,
            is_late = update.is_late,
            "Homework submitted"
        );

        if let Err(e) = self.queue.enqueue(homework_id).await {
            // Left in `submitted`; picked up again by `requeue_pending` on restart
            error!(homework_id = %homework_id, "Failed to queue scoring job: {}", e);
        }

        self.events.emit_lossy(TuranEvent::HomeworkSubmitted {
            homework_id,
            student_id,
            is_late: update.is_late,
            timestamp: now,
        });
        self.events.emit_lossy(TuranEvent::HomeworkTransitioned {
            homework_id,
            student_id,
            outcome: HomeworkStatus::Submitted,
            coins_awarded: 0,
            timestamp: now,
        });

        homeworks_db::load_homework(&self.db, homework_id)
            .await?
            .ok_or_else(|| HomeworkError::NotFound(format!("Homework {}", homework_id)))
    }

    /// Free slots in the scoring queue
    pub fn queue_capacity(&self) -> usize {
        self.queue.available_capacity()
    }

    /// Jobs queued but not yet picked up
    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    /// Whether the scoring pool has stopped draining the queue
    pub fn queue_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Queue every record still in `submitted` (after a restart)
    ///
    /// Start the worker pool first: with more pending records than queue
    /// capacity this waits for workers to drain the queue.
    pub async fn requeue_pending(&self) -> HwResult<usize> {
        let pending = homeworks_db::list_by_status(&self.db, HomeworkStatus::Submitted).await?;
        for hw in &pending {
            self.queue.enqueue(hw.id).await?;
        }
        if !pending.is_empty() {
            info!(count = pending.len(), "Re-queued submitted homework for scoring");
        }
        Ok(pending.len())
    }

    async fn discard_audio(&self, path: &str) {
        if let Err(e) = self.audio.remove(path).await {
            warn!(path, "Failed to remove unused audio: {}", e);
        }
    }
}
