//! Scoring worker and worker pool
//!
//! For each job the worker:
//! 1. claims the homework id (duplicate jobs are skipped)
//! 2. reloads the record and skips anything not in `submitted`
//! 3. transcribes the audio, retrying with backoff and a per-attempt timeout
//! 4. scores the transcript against the lesson's expected text
//! 5. writes transcript, scored fields, status and any coin credit in one
//!    database transaction, then emits events
//!
//! When transcription cannot be completed the record moves to
//! `under_review` with a note for the teacher instead of failing.

use futures::StreamExt;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use turan_common::db::HomeworkStatus;
use turan_common::events::{EventBus, TuranEvent};
use turan_common::time;

use super::queue::{ClaimSet, ScoringJob};
use super::similarity::{clean_transcript, similarity};
use super::transcriber::{Transcriber, TranscriptionResult};
use crate::config::{AssessmentSettings, SettingsHandle, TRANSCRIPTION_BACKOFF_CAP_MS};
use crate::db::homeworks::{self as homeworks_db, ScoreUpdate};
use crate::db::{activity, transcripts as transcripts_db};
use crate::error::{HomeworkError, HwResult};
use crate::models::{HomeworkSubmission, Transcript};
use crate::services::audio_store::AudioStore;
use crate::services::ledger::{CoinLedger, PostedTransaction};
use crate::utils::{retry_on_lock, retry_with_backoff, RetryPolicy};

const LOCK_WAIT_MS: u64 = 5000;

/// What happened to one job
#[derive(Debug, Clone, PartialEq)]
pub enum ScoringOutcome {
    /// Stale, duplicate, or no longer `submitted`
    Skipped,
    Approved { score: f64, coins_awarded: u32 },
    Rejected { score: f64 },
    /// Left for manual review
    UnderReview { note: String },
}

/// Processes scoring jobs
pub struct ScoringWorker {
    db: SqlitePool,
    settings: SettingsHandle,
    ledger: Arc<CoinLedger>,
    transcriber: Arc<dyn Transcriber>,
    audio: AudioStore,
    events: EventBus,
    claims: Arc<ClaimSet>,
}

impl ScoringWorker {
    pub fn new(
        db: SqlitePool,
        settings: SettingsHandle,
        ledger: Arc<CoinLedger>,
        transcriber: Arc<dyn Transcriber>,
        audio: AudioStore,
        events: EventBus,
    ) -> Self {
        Self {
            db,
            settings,
            ledger,
            transcriber,
            audio,
            events,
            claims: ClaimSet::new(),
        }
    }

    /// Score one homework record
    pub async fn process(&self, homework_id: Uuid) -> HwResult<ScoringOutcome> {
        let Some(_claim) = self.claims.try_claim(homework_id) else {
            debug!(homework_id = %homework_id, "Homework already being scored, skipping job");
            return Ok(ScoringOutcome::Skipped);
        };

        let hw = match homeworks_db::load_homework(&self.db, homework_id).await? {
            Some(hw) if hw.status == HomeworkStatus::Submitted => hw,
            Some(hw) => {
                debug!(homework_id = %homework_id, status = %hw.status, "Stale scoring job, skipping");
                return Ok(ScoringOutcome::Skipped);
            }
            None => {
                debug!(homework_id = %homework_id, "Homework no longer exists, skipping job");
                return Ok(ScoringOutcome::Skipped);
            }
        };

        let settings = self.settings.current();

        if !settings.audio_processing_enabled {
            return self
                .fall_back(&hw, "Automatic scoring is disabled; awaiting manual review")
                .await;
        }

        let Some(lesson) = activity::load_lesson(&self.db, hw.lesson_id).await? else {
            return self.fall_back(&hw, "Lesson not found for scoring").await;
        };

        let audio = match &hw.audio_path {
            Some(path) => match self.audio.read(path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    return self
                        .fall_back(&hw, &format!("Audio could not be read: {}", e))
                        .await
                }
            },
            None => return self.fall_back(&hw, "Submission has no audio").await,
        };
        let content_type = hw
            .audio_content_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let started = Instant::now();
        let transcription = match self.transcribe(&audio, &content_type, &settings).await {
            Ok(result) => result,
            Err(e) => {
                let note = format!(
                    "Transcription failed after {} attempts: {}",
                    settings.transcription_max_attempts, e
                );
                return self.fall_back(&hw, &note).await;
            }
        };
        let processing_ms = started.elapsed().as_millis() as u64;

        let cleaned = clean_transcript(&transcription.text);
        let score = similarity(settings.similarity_metric, &cleaned, &lesson.expected_text);
        let passed = score >= settings.similarity_threshold;
        let coins_awarded = if passed { settings.homework_approved_coins } else { 0 };

        let transcript = Transcript {
            homework_id: hw.id,
            raw_text: transcription.text.clone(),
            cleaned_text: cleaned,
            confidence: transcription.confidence,
            language: transcription.language.clone().unwrap_or_else(|| "unknown".to_string()),
            processing_ms,
            created_at: time::now(),
        };

        let (hw_ref, transcript_ref) = (&hw, &transcript);
        let committed = retry_on_lock("scoring commit", LOCK_WAIT_MS, move || {
            self.commit_score(hw_ref, transcript_ref, score, passed, coins_awarded)
        })
        .await;

        let posted = match committed {
            Ok(Some(posted)) => posted,
            Ok(None) => {
                debug!(homework_id = %hw.id, "Homework changed during scoring, result discarded");
                return Ok(ScoringOutcome::Skipped);
            }
            Err(e @ HomeworkError::LedgerInvariant(_)) => {
                self.ledger.after_rollback(hw.student_id, &e).await;
                return self
                    .fall_back(&hw, &format!("Coin credit refused: {}", e))
                    .await;
            }
            Err(e) => return Err(e),
        };

        if let Some(posted) = &posted {
            self.ledger.announce(posted);
        }

        let status = if passed {
            HomeworkStatus::Approved
        } else {
            HomeworkStatus::Rejected
        };
        info!(
            homework_id = %hw.id,
            student_id = %hw.student_id,
            score,
            threshold = settings.similarity_threshold,
            outcome = %status,
            coins_awarded,
            "Homework scored"
        );
        self.emit_transition(&hw, status, coins_awarded);

        Ok(if passed {
            ScoringOutcome::Approved { score, coins_awarded }
        } else {
            ScoringOutcome::Rejected { score }
        })
    }

    async fn transcribe(
        &self,
        audio: &[u8],
        content_type: &str,
        settings: &AssessmentSettings,
    ) -> HwResult<TranscriptionResult> {
        let policy = RetryPolicy {
            max_attempts: settings.transcription_max_attempts,
            initial_backoff: Duration::from_millis(settings.transcription_backoff_ms),
            max_backoff: Duration::from_millis(TRANSCRIPTION_BACKOFF_CAP_MS),
        };
        let timeout = Duration::from_millis(settings.transcription_timeout_ms);
        let transcriber = &self.transcriber;

        retry_with_backoff("transcription", policy, |attempt| async move {
            debug!(attempt, "Calling transcription service");
            match tokio::time::timeout(timeout, transcriber.transcribe(audio, content_type)).await {
                Ok(result) => result,
                Err(_) => Err(HomeworkError::ExternalService(format!(
                    "Transcription timed out after {} ms",
                    timeout.as_millis()
                ))),
            }
        })
        .await
    }

    /// Write the scored result; `Ok(None)` when the record left `submitted`
    async fn commit_score(
        &self,
        hw: &HomeworkSubmission,
        transcript: &Transcript,
        score: f64,
        passed: bool,
        coins_awarded: u32,
    ) -> HwResult<Option<Option<PostedTransaction>>> {
        let guard = if passed {
            Some(self.ledger.lock_account(hw.student_id).await)
        } else {
            None
        };

        let mut tx = self.db.begin().await?;

        transcripts_db::replace_transcript(&mut tx, transcript).await?;

        let update = ScoreUpdate {
            status: if passed {
                HomeworkStatus::Approved
            } else {
                HomeworkStatus::Rejected
            },
            transcription: &transcript.cleaned_text,
            similarity_score: score,
            passed,
            coins_awarded,
        };
        if !homeworks_db::record_score(&mut *tx, hw.id, &update, time::now()).await? {
            return Ok(None);
        }

        let posted = match &guard {
            Some(guard) => {
                self.ledger
                    .credit_homework_in(&mut tx, guard, hw.id, hw.lesson_id, coins_awarded)
                    .await?
            }
            None => None,
        };

        tx.commit().await?;
        Ok(Some(posted))
    }

    async fn fall_back(&self, hw: &HomeworkSubmission, note: &str) -> HwResult<ScoringOutcome> {
        let moved = retry_on_lock("scoring fallback", LOCK_WAIT_MS, move || async move {
            Ok(homeworks_db::mark_under_review(&self.db, hw.id, note, time::now()).await?)
        })
        .await?;

        if !moved {
            return Ok(ScoringOutcome::Skipped);
        }

        warn!(homework_id = %hw.id, note, "Homework routed to manual review");
        self.emit_transition(hw, HomeworkStatus::UnderReview, 0);
        Ok(ScoringOutcome::UnderReview {
            note: note.to_string(),
        })
    }

    fn emit_transition(&self, hw: &HomeworkSubmission, outcome: HomeworkStatus, coins_awarded: u32) {
        self.events.emit_lossy(TuranEvent::HomeworkTransitioned {
            homework_id: hw.id,
            student_id: hw.student_id,
            outcome,
            coins_awarded,
            timestamp: time::now(),
        });
    }
}

/// Bounded pool draining the scoring queue
pub struct WorkerPool;

impl WorkerPool {
    /// Process jobs with up to `workers` in flight until the queue closes or
    /// `cancel` fires
    pub fn spawn(
        worker: Arc<ScoringWorker>,
        rx: mpsc::Receiver<ScoringJob>,
        workers: usize,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let workers = workers.max(1);
        info!(workers, "Scoring worker pool started");

        tokio::spawn(async move {
            ReceiverStream::new(rx)
                .take_until(cancel.cancelled_owned())
                .for_each_concurrent(workers, |job| {
                    let worker = Arc::clone(&worker);
                    async move {
                        match worker.process(job.homework_id).await {
                            Ok(outcome) => {
                                debug!(homework_id = %job.homework_id, ?outcome, "Scoring job finished")
                            }
                            Err(e) => {
                                error!(homework_id = %job.homework_id, "Scoring job failed: {}", e)
                            }
                        }
                    }
                })
                .await;

            info!("Scoring worker pool stopped");
        })
    }
}
