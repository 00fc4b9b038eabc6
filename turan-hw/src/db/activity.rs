//! Read access to users, groups, lessons and attendance
//!
//! These tables are owned by other parts of the platform; this service only
//! reads them.

use sqlx::{Row, Sqlite, SqlitePool};
use uuid::Uuid;

use turan_common::db::Role;
use turan_common::Result;

use super::{parse_uuid, parse_uuid_opt, to_u32};
use crate::models::StudentStanding;

/// Lesson fields the homework pipeline needs
#[derive(Debug, Clone, PartialEq)]
pub struct LessonInfo {
    pub id: Uuid,
    pub group_id: Uuid,
    pub title: String,
    /// Reference text the student is expected to read aloud
    pub expected_text: String,
}

pub async fn load_lesson<'e, E>(executor: E, lesson_id: Uuid) -> Result<Option<LessonInfo>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT id, group_id, title, expected_text FROM lessons WHERE id = ?")
        .bind(lesson_id.to_string())
        .fetch_optional(executor)
        .await?;

    match row {
        Some(row) => Ok(Some(LessonInfo {
            id: parse_uuid(row.get("id"))?,
            group_id: parse_uuid(row.get("group_id"))?,
            title: row.get("title"),
            expected_text: row.get("expected_text"),
        })),
        None => Ok(None),
    }
}

pub async fn user_role<'e, E>(executor: E, user_id: Uuid) -> Result<Option<Role>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let role: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE id = ?")
        .bind(user_id.to_string())
        .fetch_optional(executor)
        .await?;

    role.map(|r| r.parse()).transpose()
}

pub async fn group_exists<'e, E>(executor: E, group_id: Uuid) -> Result<bool>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM groups WHERE id = ?")
        .bind(group_id.to_string())
        .fetch_one(executor)
        .await?;
    Ok(count > 0)
}

/// Teacher assigned to a group, if any
pub async fn group_teacher<'e, E>(executor: E, group_id: Uuid) -> Result<Option<Uuid>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let teacher: Option<Option<String>> =
        sqlx::query_scalar("SELECT teacher_id FROM groups WHERE id = ?")
            .bind(group_id.to_string())
            .fetch_optional(executor)
            .await?;

    parse_uuid_opt(teacher.flatten())
}

/// Students of a group, ordered by id
pub async fn group_students<'e, E>(executor: E, group_id: Uuid) -> Result<Vec<Uuid>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT student_id FROM group_students WHERE group_id = ? ORDER BY student_id ASC",
    )
    .bind(group_id.to_string())
    .fetch_all(executor)
    .await?;

    ids.iter().map(|id| parse_uuid(id)).collect()
}

pub async fn all_group_ids<'e, E>(executor: E) -> Result<Vec<Uuid>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM groups ORDER BY id ASC")
        .fetch_all(executor)
        .await?;

    ids.iter().map(|id| parse_uuid(id)).collect()
}

/// Gather ranking inputs for one student within one group
///
/// - coins: current account total (0 without an account)
/// - lessons completed: completed group lessons the student attended
///   (present or late)
/// - homeworks completed: approved or second-chance records in the group
/// - attendance: present / all attendance records in the group, as a
///   percentage (0 without records)
pub async fn student_standing(pool: &SqlitePool, group_id: Uuid, student_id: Uuid) -> Result<StudentStanding> {
    let group = group_id.to_string();
    let student = student_id.to_string();

    let coins: Option<i64> = sqlx::query_scalar("SELECT total FROM coin_accounts WHERE student_id = ?")
        .bind(&student)
        .fetch_optional(pool)
        .await?;

    let lessons_completed: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM lessons l
        JOIN attendance a ON a.lesson_id = l.id
        WHERE l.group_id = ? AND l.status = 'completed'
          AND a.student_id = ? AND a.status IN ('present', 'late')
        "#,
    )
    .bind(&group)
    .bind(&student)
    .fetch_one(pool)
    .await?;

    let homeworks_completed: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM homeworks h
        JOIN lessons l ON l.id = h.lesson_id
        WHERE l.group_id = ? AND h.student_id = ?
          AND h.status IN ('approved', 'second_chance')
        "#,
    )
    .bind(&group)
    .bind(&student)
    .fetch_one(pool)
    .await?;

    let attendance = sqlx::query(
        r#"
        SELECT
            COUNT(*) AS total,
            COALESCE(SUM(CASE WHEN a.status = 'present' THEN 1 ELSE 0 END), 0) AS present
        FROM attendance a
        JOIN lessons l ON l.id = a.lesson_id
        WHERE l.group_id = ? AND a.student_id = ?
        "#,
    )
    .bind(&group)
    .bind(&student)
    .fetch_one(pool)
    .await?;

    let total: i64 = attendance.get("total");
    let present: i64 = attendance.get("present");

    Ok(StudentStanding {
        student_id,
        coins: to_u32(coins.unwrap_or(0), "total")?,
        lessons_completed: to_u32(lessons_completed, "lessons_completed")?,
        homeworks_completed: to_u32(homeworks_completed, "homeworks_completed")?,
        attendance_percentage: attendance_percentage(present, total),
    })
}

fn attendance_percentage(present: i64, total: i64) -> f64 {
    if total <= 0 {
        0.0
    } else {
        present as f64 / total as f64 * 100.0
    }
}
