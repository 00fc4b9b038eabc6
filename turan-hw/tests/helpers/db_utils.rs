//! Database Test Utilities
//!
//! Temporary databases and seed data for users, groups, lessons and payments

use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;

use turan_common::time;

/// Create temporary test database with the schema applied
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_turan.db");
    let pool = turan_common::db::init_database(&db_path).await?;
    Ok((temp_dir, pool))
}

pub async fn seed_user(pool: &SqlitePool, role: &str, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, full_name, role) VALUES (?, ?, ?)")
        .bind(id.to_string())
        .bind(name)
        .bind(role)
        .execute(pool)
        .await
        .unwrap();
    id
}

pub async fn seed_group(pool: &SqlitePool, teacher_id: Uuid, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO groups (id, name, teacher_id) VALUES (?, ?, ?)")
        .bind(id.to_string())
        .bind(name)
        .bind(teacher_id.to_string())
        .execute(pool)
        .await
        .unwrap();
    id
}

pub async fn add_student(pool: &SqlitePool, group_id: Uuid, student_id: Uuid) {
    sqlx::query("INSERT INTO group_students (group_id, student_id) VALUES (?, ?)")
        .bind(group_id.to_string())
        .bind(student_id.to_string())
        .execute(pool)
        .await
        .unwrap();
}

pub async fn seed_lesson(pool: &SqlitePool, group_id: Uuid, expected_text: &str, status: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO lessons (id, group_id, title, expected_text, status, scheduled_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(group_id.to_string())
    .bind("Reading practice")
    .bind(expected_text)
    .bind(status)
    .bind(time::to_db(&(Utc::now() - Duration::days(1))))
    .execute(pool)
    .await
    .unwrap();
    id
}

pub async fn mark_attendance(pool: &SqlitePool, lesson_id: Uuid, student_id: Uuid, status: &str) {
    sqlx::query(
        "INSERT OR REPLACE INTO attendance (lesson_id, student_id, status, marked_at) VALUES (?, ?, ?, ?)",
    )
    .bind(lesson_id.to_string())
    .bind(student_id.to_string())
    .bind(status)
    .bind(time::to_db(&Utc::now()))
    .execute(pool)
    .await
    .unwrap();
}

pub async fn seed_payment(pool: &SqlitePool, student_id: Uuid, due_date: NaiveDate, status: &str) -> Uuid {
    let id = Uuid::new_v4();
    let now = time::to_db(&Utc::now());
    sqlx::query(
        "INSERT INTO payments (id, student_id, amount, status, due_date, created_at, updated_at) \
         VALUES (?, ?, 5000, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(student_id.to_string())
    .bind(status)
    .bind(time::date_to_db(&due_date))
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .unwrap();
    id
}

pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn count_rows(pool: &SqlitePool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
}

/// One group with a teacher, students and a completed lesson
pub struct Classroom {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub admin: Uuid,
    pub teacher: Uuid,
    /// Teacher of a different group
    pub other_teacher: Uuid,
    pub group: Uuid,
    pub students: Vec<Uuid>,
    pub lesson: Uuid,
}

impl Classroom {
    pub async fn new(student_count: usize, expected_text: &str) -> Self {
        let (dir, pool) = create_test_db().await.unwrap();

        let admin = seed_user(&pool, "admin", "Aigerim Admin").await;
        let teacher = seed_user(&pool, "teacher", "Timur Teacher").await;
        let other_teacher = seed_user(&pool, "teacher", "Olga Other").await;
        let group = seed_group(&pool, teacher, "Group A").await;
        seed_group(&pool, other_teacher, "Group B").await;

        let mut students = Vec::with_capacity(student_count);
        for i in 0..student_count {
            let student = seed_user(&pool, "student", &format!("Student {}", i + 1)).await;
            add_student(&pool, group, student).await;
            students.push(student);
        }

        let lesson = seed_lesson(&pool, group, expected_text, "completed").await;

        Self {
            dir,
            pool,
            admin,
            teacher,
            other_teacher,
            group,
            students,
            lesson,
        }
    }
}
