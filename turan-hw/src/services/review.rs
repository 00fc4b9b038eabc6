//! Review state machine
//!
//! Manual decisions by the group's teacher or an admin, and second-chance
//! grants. Every write is guarded on the status the reviewer loaded, so a
//! concurrent change (for example the scoring worker finishing first) turns
//! into `InvalidState` instead of a lost update.

use chrono::Duration;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use turan_common::db::HomeworkStatus;
use turan_common::events::{EventBus, TuranEvent};
use turan_common::time;

use crate::config::SettingsHandle;
use crate::db::activity;
use crate::db::homeworks::{self as homeworks_db, ReviewUpdate};
use crate::error::{HomeworkError, HwResult};
use crate::models::{HomeworkSubmission, ReviewAction, ReviewDecision};
use crate::services::authz::{Authorizer, Caller, Capabilities};
use crate::services::ledger::{CoinLedger, PostedTransaction};
use crate::utils::retry_on_lock;

const LOCK_WAIT_MS: u64 = 5000;

pub struct ReviewService {
    db: SqlitePool,
    settings: SettingsHandle,
    ledger: Arc<CoinLedger>,
    authorizer: Arc<dyn Authorizer>,
    events: EventBus,
}

impl ReviewService {
    pub fn new(
        db: SqlitePool,
        settings: SettingsHandle,
        ledger: Arc<CoinLedger>,
        authorizer: Arc<dyn Authorizer>,
        events: EventBus,
    ) -> Self {
        Self {
            db,
            settings,
            ledger,
            authorizer,
            events,
        }
    }

    /// Load a record visible to `caller` (owner, group teacher or admin)
    pub async fn view(&self, caller: &Caller, homework_id: Uuid) -> HwResult<HomeworkSubmission> {
        let (hw, caps) = self.load_with_caps(caller, homework_id).await?;
        if !caps.can_view() {
            return Err(HomeworkError::NotFound(format!("Homework {}", homework_id)));
        }
        Ok(hw)
    }

    /// Record a teacher decision
    pub async fn review(
        &self,
        caller: &Caller,
        homework_id: Uuid,
        decision: ReviewDecision,
        feedback: &str,
    ) -> HwResult<HomeworkSubmission> {
        let (hw, caps) = self.load_with_caps(caller, homework_id).await?;
        caps.require_review("review homework")?;

        let settings = self.settings.current();
        let action = hw.review_action(decision, settings.max_homework_attempts)?;
        let coins_awarded = match action {
            ReviewAction::Approve => settings.homework_approved_coins,
            ReviewAction::Reject => 0,
            ReviewAction::Refresh => hw.coins_awarded,
        };

        let update = ReviewUpdate {
            status: decision.status(),
            coins_awarded,
            feedback,
            reviewer: caller.user_id,
            reviewed_at: time::now(),
        };

        let (hw_ref, update_ref) = (&hw, &update);
        let committed = retry_on_lock("homework review", LOCK_WAIT_MS, move || {
            self.commit_review(hw_ref, action, update_ref)
        })
        .await;

        let posted = match committed {
            Ok(posted) => posted,
            Err(e) => {
                self.ledger.after_rollback(hw.student_id, &e).await;
                return Err(e);
            }
        };

        if let Some(posted) = &posted {
            self.ledger.announce(posted);
        }

        info!(
            homework_id = %homework_id,
            reviewer = %caller.user_id,
            from = %hw.status,
            to = %update.status,
            coins_awarded,
            "Homework reviewed"
        );

        if action != ReviewAction::Refresh {
            self.events.emit_lossy(TuranEvent::HomeworkTransitioned {
                homework_id,
                student_id: hw.student_id,
                outcome: update.status,
                coins_awarded,
                timestamp: update.reviewed_at,
            });
        }

        self.reload(homework_id).await
    }

    async fn commit_review(
        &self,
        hw: &HomeworkSubmission,
        action: ReviewAction,
        update: &ReviewUpdate<'_>,
    ) -> HwResult<Option<PostedTransaction>> {
        let guard = match action {
            ReviewAction::Approve => Some(self.ledger.lock_account(hw.student_id).await),
            _ => None,
        };

        let mut tx = self.db.begin().await?;

        ensure_latest_attempt(&mut *tx, hw).await?;
        if !homeworks_db::apply_review(&mut *tx, hw.id, hw.status, update).await? {
            return Err(HomeworkError::InvalidState(format!(
                "Homework {} changed while it was being reviewed",
                hw.id
            )));
        }

        let posted = match &guard {
            Some(guard) => {
                self.ledger
                    .credit_homework_in(&mut tx, guard, hw.id, hw.lesson_id, update.coins_awarded)
                    .await?
            }
            None => None,
        };

        tx.commit().await?;
        Ok(posted)
    }

    /// Open a new attempt after a rejection
    ///
    /// The rejected record is left as it is; the new record carries the
    /// next attempt number in `second_chance` with a fresh deadline.
    pub async fn grant_second_chance(
        &self,
        caller: &Caller,
        homework_id: Uuid,
    ) -> HwResult<HomeworkSubmission> {
        let (hw, caps) = self.load_with_caps(caller, homework_id).await?;
        caps.require_review("grant a second chance")?;

        let settings = self.settings.current();
        hw.ensure_second_chance_allowed(settings.max_homework_attempts)?;

        ensure_latest_attempt(&self.db, &hw).await?;

        let now = time::now();
        let next = HomeworkSubmission::new_attempt(
            hw.lesson_id,
            hw.student_id,
            hw.attempt_number + 1,
            HomeworkStatus::SecondChance,
            now + Duration::hours(i64::from(settings.homework_deadline_hours)),
            now,
        );

        if !homeworks_db::insert_homework(&self.db, &next).await? {
            return Err(HomeworkError::InvalidState(format!(
                "Attempt {} already exists for homework {}",
                next.attempt_number, homework_id
            )));
        }

        info!(
            homework_id = %homework_id,
            new_homework_id = %next.id,
            attempt = next.attempt_number,
            reviewer = %caller.user_id,
            "Second chance granted"
        );

        self.events.emit_lossy(TuranEvent::HomeworkAssigned {
            homework_id: next.id,
            lesson_id: next.lesson_id,
            student_id: next.student_id,
            attempt_number: next.attempt_number,
            deadline: next.deadline,
            timestamp: now,
        });
        self.events.emit_lossy(TuranEvent::HomeworkTransitioned {
            homework_id: next.id,
            student_id: next.student_id,
            outcome: HomeworkStatus::SecondChance,
            coins_awarded: 0,
            timestamp: now,
        });

        Ok(next)
    }

    async fn load_with_caps(
        &self,
        caller: &Caller,
        homework_id: Uuid,
    ) -> HwResult<(HomeworkSubmission, Capabilities)> {
        let hw = self.reload(homework_id).await?;
        let lesson = activity::load_lesson(&self.db, hw.lesson_id)
            .await?
            .ok_or_else(|| HomeworkError::NotFound(format!("Lesson {}", hw.lesson_id)))?;

        let caps = Capabilities::evaluate(
            self.authorizer.as_ref(),
            caller,
            lesson.group_id,
            Some(hw.student_id),
        )
        .await?;
        Ok((hw, caps))
    }

    async fn reload(&self, homework_id: Uuid) -> HwResult<HomeworkSubmission> {
        homeworks_db::load_homework(&self.db, homework_id)
            .await?
            .ok_or_else(|| HomeworkError::NotFound(format!("Homework {}", homework_id)))
    }
}

/// Superseded attempts are frozen; only the newest record for a
/// (lesson, student) pair may change state.
async fn ensure_latest_attempt<'e, E>(executor: E, hw: &HomeworkSubmission) -> HwResult<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let latest = homeworks_db::latest_attempt(executor, hw.lesson_id, hw.student_id).await?;
    if latest != Some(hw.attempt_number) {
        return Err(HomeworkError::InvalidState(format!(
            "Homework {} has been superseded by a later attempt",
            hw.id
        )));
    }
    Ok(())
}
