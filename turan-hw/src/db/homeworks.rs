//! Homework record persistence
//!
//! Every state-changing UPDATE carries a `WHERE status ...` guard and
//! reports whether a row changed. A `false` return means another writer
//! advanced the record first.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite};
use uuid::Uuid;

use turan_common::db::HomeworkStatus;
use turan_common::{time, Result};

use super::{parse_uuid, parse_uuid_opt, to_u32};
use crate::models::HomeworkSubmission;

const COLUMNS: &str = "id, lesson_id, student_id, status, attempt_number, audio_path, \
    audio_content_type, submitted_at, transcription, similarity_score, is_similarity_passed, \
    teacher_feedback, error_note, reviewed_by, reviewed_at, deadline, is_late, coins_awarded, \
    created_at, updated_at";

fn row_to_homework(row: &SqliteRow) -> Result<HomeworkSubmission> {
    let status: String = row.get("status");
    let passed: Option<i64> = row.get("is_similarity_passed");

    Ok(HomeworkSubmission {
        id: parse_uuid(row.get("id"))?,
        lesson_id: parse_uuid(row.get("lesson_id"))?,
        student_id: parse_uuid(row.get("student_id"))?,
        status: status.parse()?,
        attempt_number: to_u32(row.get("attempt_number"), "attempt_number")?,
        audio_path: row.get("audio_path"),
        audio_content_type: row.get("audio_content_type"),
        submitted_at: time::from_db_opt(row.get("submitted_at"))?,
        transcription: row.get("transcription"),
        similarity_score: row.get("similarity_score"),
        is_similarity_passed: passed.map(|v| v != 0),
        teacher_feedback: row.get("teacher_feedback"),
        error_note: row.get("error_note"),
        reviewed_by: parse_uuid_opt(row.get("reviewed_by"))?,
        reviewed_at: time::from_db_opt(row.get("reviewed_at"))?,
        deadline: time::from_db(row.get("deadline"))?,
        is_late: row.get::<i64, _>("is_late") != 0,
        coins_awarded: to_u32(row.get("coins_awarded"), "coins_awarded")?,
        created_at: time::from_db(row.get("created_at"))?,
        updated_at: time::from_db(row.get("updated_at"))?,
    })
}

/// Insert a new attempt record
///
/// Returns `false` when (lesson, student, attempt) already exists.
pub async fn insert_homework<'e, E>(executor: E, hw: &HomeworkSubmission) -> Result<bool>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO homeworks (
            id, lesson_id, student_id, status, attempt_number, teacher_feedback,
            deadline, is_late, coins_awarded, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?)
        "#,
    )
    .bind(hw.id.to_string())
    .bind(hw.lesson_id.to_string())
    .bind(hw.student_id.to_string())
    .bind(hw.status.as_str())
    .bind(i64::from(hw.attempt_number))
    .bind(&hw.teacher_feedback)
    .bind(time::to_db(&hw.deadline))
    .bind(time::to_db(&hw.created_at))
    .bind(time::to_db(&hw.updated_at))
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn load_homework<'e, E>(executor: E, id: Uuid) -> Result<Option<HomeworkSubmission>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!("SELECT {} FROM homeworks WHERE id = ?", COLUMNS))
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(row_to_homework).transpose()
}

/// Highest attempt number recorded for (lesson, student)
pub async fn latest_attempt<'e, E>(executor: E, lesson_id: Uuid, student_id: Uuid) -> Result<Option<u32>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let max: Option<i64> = sqlx::query_scalar(
        "SELECT MAX(attempt_number) FROM homeworks WHERE lesson_id = ? AND student_id = ?",
    )
    .bind(lesson_id.to_string())
    .bind(student_id.to_string())
    .fetch_one(executor)
    .await?;

    max.map(|v| to_u32(v, "attempt_number")).transpose()
}

/// Number of records in one status
pub async fn count_by_status<'e, E>(executor: E, status: HomeworkStatus) -> Result<u64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM homeworks WHERE status = ?")
        .bind(status.as_str())
        .fetch_one(executor)
        .await?;
    Ok(count.max(0) as u64)
}

/// All records in one status, oldest first
pub async fn list_by_status<'e, E>(executor: E, status: HomeworkStatus) -> Result<Vec<HomeworkSubmission>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(&format!(
        "SELECT {} FROM homeworks WHERE status = ? ORDER BY updated_at ASC",
        COLUMNS
    ))
    .bind(status.as_str())
    .fetch_all(executor)
    .await?;

    rows.iter().map(row_to_homework).collect()
}

/// Open records (assigned or second_chance) whose deadline is in `(from, until]`
pub async fn open_with_deadline_between<'e, E>(
    executor: E,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<HomeworkSubmission>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(&format!(
        "SELECT {} FROM homeworks \
         WHERE status IN ('assigned', 'second_chance') AND deadline > ? AND deadline <= ? \
         ORDER BY deadline ASC",
        COLUMNS
    ))
    .bind(time::to_db(&from))
    .bind(time::to_db(&until))
    .fetch_all(executor)
    .await?;

    rows.iter().map(row_to_homework).collect()
}

/// Accepted audio for an open record
#[derive(Debug, Clone)]
pub struct SubmissionUpdate<'a> {
    pub audio_path: &'a str,
    pub content_type: &'a str,
    pub submitted_at: DateTime<Utc>,
    pub is_late: bool,
}

/// Move an open record owned by `student_id` to `submitted`
///
/// The late flag is only ever raised, never cleared.
pub async fn mark_submitted<'e, E>(
    executor: E,
    id: Uuid,
    student_id: Uuid,
    update: &SubmissionUpdate<'_>,
) -> Result<bool>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE homeworks
        SET status = 'submitted',
            audio_path = ?,
            audio_content_type = ?,
            submitted_at = ?,
            is_late = MAX(is_late, ?),
            error_note = NULL,
            updated_at = ?
        WHERE id = ? AND student_id = ? AND status IN ('assigned', 'second_chance')
        "#,
    )
    .bind(update.audio_path)
    .bind(update.content_type)
    .bind(time::to_db(&update.submitted_at))
    .bind(update.is_late as i64)
    .bind(time::to_db(&update.submitted_at))
    .bind(id.to_string())
    .bind(student_id.to_string())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Scored fields written together with the transition out of `submitted`
#[derive(Debug, Clone)]
pub struct ScoreUpdate<'a> {
    pub status: HomeworkStatus,
    pub transcription: &'a str,
    pub similarity_score: f64,
    pub passed: bool,
    pub coins_awarded: u32,
}

pub async fn record_score<'e, E>(
    executor: E,
    id: Uuid,
    update: &ScoreUpdate<'_>,
    now: DateTime<Utc>,
) -> Result<bool>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE homeworks
        SET status = ?,
            transcription = ?,
            similarity_score = ?,
            is_similarity_passed = ?,
            coins_awarded = ?,
            error_note = NULL,
            updated_at = ?
        WHERE id = ? AND status = 'submitted'
        "#,
    )
    .bind(update.status.as_str())
    .bind(update.transcription)
    .bind(update.similarity_score)
    .bind(update.passed as i64)
    .bind(i64::from(update.coins_awarded))
    .bind(time::to_db(&now))
    .bind(id.to_string())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Fall back from `submitted` to `under_review` with a note for the teacher
pub async fn mark_under_review<'e, E>(
    executor: E,
    id: Uuid,
    note: &str,
    now: DateTime<Utc>,
) -> Result<bool>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE homeworks
        SET status = 'under_review', error_note = ?, updated_at = ?
        WHERE id = ? AND status = 'submitted'
        "#,
    )
    .bind(note)
    .bind(time::to_db(&now))
    .bind(id.to_string())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Manual review outcome
#[derive(Debug, Clone)]
pub struct ReviewUpdate<'a> {
    pub status: HomeworkStatus,
    pub coins_awarded: u32,
    pub feedback: &'a str,
    pub reviewer: Uuid,
    pub reviewed_at: DateTime<Utc>,
}

/// Apply a review, guarded on the status the reviewer saw
pub async fn apply_review<'e, E>(
    executor: E,
    id: Uuid,
    expected: HomeworkStatus,
    update: &ReviewUpdate<'_>,
) -> Result<bool>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE homeworks
        SET status = ?,
            coins_awarded = ?,
            teacher_feedback = ?,
            reviewed_by = ?,
            reviewed_at = ?,
            updated_at = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(update.status.as_str())
    .bind(i64::from(update.coins_awarded))
    .bind(update.feedback)
    .bind(update.reviewer.to_string())
    .bind(time::to_db(&update.reviewed_at))
    .bind(time::to_db(&update.reviewed_at))
    .bind(id.to_string())
    .bind(expected.as_str())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}
