//! Homework assignment
//!
//! Opens attempt 1 for every student of a lesson's group. Re-running for the
//! same lesson only creates records for students who do not have one yet.

use chrono::Duration;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use turan_common::db::HomeworkStatus;
use turan_common::events::{EventBus, TuranEvent};
use turan_common::time;

use crate::config::SettingsHandle;
use crate::db::{activity, homeworks as homeworks_db};
use crate::error::{HomeworkError, HwResult};
use crate::models::HomeworkSubmission;
use crate::services::authz::{Authorizer, Caller, Capabilities};

pub struct HomeworkAssigner {
    db: SqlitePool,
    settings: SettingsHandle,
    authorizer: Arc<dyn Authorizer>,
    events: EventBus,
}

impl HomeworkAssigner {
    pub fn new(
        db: SqlitePool,
        settings: SettingsHandle,
        authorizer: Arc<dyn Authorizer>,
        events: EventBus,
    ) -> Self {
        Self {
            db,
            settings,
            authorizer,
            events,
        }
    }

    /// Assign on behalf of `caller` (the group's teacher or an admin)
    pub async fn assign_as(&self, caller: &Caller, lesson_id: Uuid) -> HwResult<Vec<HomeworkSubmission>> {
        let lesson = activity::load_lesson(&self.db, lesson_id)
            .await?
            .ok_or_else(|| HomeworkError::NotFound(format!("Lesson {}", lesson_id)))?;

        Capabilities::evaluate(self.authorizer.as_ref(), caller, lesson.group_id, None)
            .await?
            .require_review("assign homework")?;

        self.assign_lesson(lesson_id).await
    }

    /// Create attempt 1 for each student in the lesson's group
    ///
    /// Returns only the records created by this call.
    pub async fn assign_lesson(&self, lesson_id: Uuid) -> HwResult<Vec<HomeworkSubmission>> {
        let lesson = activity::load_lesson(&self.db, lesson_id)
            .await?
            .ok_or_else(|| HomeworkError::NotFound(format!("Lesson {}", lesson_id)))?;

        let settings = self.settings.current();
        let students = activity::group_students(&self.db, lesson.group_id).await?;
        let now = time::now();
        let deadline = now + Duration::hours(i64::from(settings.homework_deadline_hours));

        let mut created = Vec::new();
        let mut tx = self.db.begin().await?;
        for student_id in students {
            let hw = HomeworkSubmission::new_attempt(
                lesson_id,
                student_id,
                1,
                HomeworkStatus::Assigned,
                deadline,
                now,
            );
            if homeworks_db::insert_homework(&mut *tx, &hw).await? {
                created.push(hw);
            }
        }
        tx.commit().await?;

        info!(
            lesson_id = %lesson_id,
            created = created.len(),
            deadline = %deadline,
            "Homework assigned"
        );

        for hw in &created {
            self.events.emit_lossy(TuranEvent::HomeworkAssigned {
                homework_id: hw.id,
                lesson_id,
                student_id: hw.student_id,
                attempt_number: hw.attempt_number,
                deadline: hw.deadline,
                timestamp: now,
            });
        }

        Ok(created)
    }
}
