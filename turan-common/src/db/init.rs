//! Database initialization
//!
//! Opens (or creates) the shared SQLite database and creates every table the
//! services use. Table creation is idempotent and runs on each startup.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::Result;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas go on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes (idempotent)
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_users_table(pool).await?;
    create_groups_tables(pool).await?;
    create_lessons_table(pool).await?;
    create_attendance_table(pool).await?;
    create_homeworks_table(pool).await?;
    create_homework_transcripts_table(pool).await?;
    create_coin_tables(pool).await?;
    create_leaderboard_table(pool).await?;
    create_payment_tables(pool).await?;

    info!("Database schema initialized");
    Ok(())
}

async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('admin', 'teacher', 'student'))
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_groups_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS groups (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            teacher_id TEXT REFERENCES users(id) ON DELETE SET NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS group_students (
            group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
            student_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            PRIMARY KEY (group_id, student_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_lessons_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lessons (
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            expected_text TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'scheduled'
                CHECK (status IN ('scheduled', 'in_progress', 'completed', 'cancelled', 'rescheduled')),
            scheduled_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_lessons_group ON lessons(group_id)")
        .execute(pool)
        .await?;
    Ok(())
}

async fn create_attendance_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attendance (
            lesson_id TEXT NOT NULL REFERENCES lessons(id) ON DELETE CASCADE,
            student_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            status TEXT NOT NULL DEFAULT 'absent'
                CHECK (status IN ('present', 'absent', 'late', 'excused')),
            marked_at TEXT NOT NULL,
            PRIMARY KEY (lesson_id, student_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_homeworks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS homeworks (
            id TEXT PRIMARY KEY,
            lesson_id TEXT NOT NULL REFERENCES lessons(id) ON DELETE CASCADE,
            student_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            status TEXT NOT NULL DEFAULT 'assigned'
                CHECK (status IN ('assigned', 'submitted', 'under_review', 'approved', 'rejected', 'second_chance')),
            attempt_number INTEGER NOT NULL CHECK (attempt_number >= 1),
            audio_path TEXT,
            audio_content_type TEXT,
            submitted_at TEXT,
            transcription TEXT,
            similarity_score REAL CHECK (similarity_score IS NULL OR (similarity_score >= 0.0 AND similarity_score <= 1.0)),
            is_similarity_passed INTEGER,
            teacher_feedback TEXT NOT NULL DEFAULT '',
            error_note TEXT,
            reviewed_by TEXT REFERENCES users(id) ON DELETE SET NULL,
            reviewed_at TEXT,
            deadline TEXT NOT NULL,
            is_late INTEGER NOT NULL DEFAULT 0,
            coins_awarded INTEGER NOT NULL DEFAULT 0 CHECK (coins_awarded >= 0),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (lesson_id, student_id, attempt_number),
            CHECK (coins_awarded = 0 OR status = 'approved')
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_homeworks_status ON homeworks(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_homeworks_student ON homeworks(student_id)")
        .execute(pool)
        .await?;
    Ok(())
}

async fn create_homework_transcripts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS homework_transcripts (
            homework_id TEXT PRIMARY KEY REFERENCES homeworks(id) ON DELETE CASCADE,
            raw_text TEXT NOT NULL,
            cleaned_text TEXT NOT NULL,
            confidence REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
            language TEXT NOT NULL,
            processing_ms INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_coin_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS coin_accounts (
            student_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            total INTEGER NOT NULL DEFAULT 0,
            earned INTEGER NOT NULL DEFAULT 0,
            spent INTEGER NOT NULL DEFAULT 0,
            frozen INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS coin_transactions (
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            kind TEXT NOT NULL CHECK (kind IN ('earned', 'spent', 'bonus', 'penalty', 'refund')),
            amount INTEGER NOT NULL CHECK (amount > 0),
            reason TEXT NOT NULL,
            homework_id TEXT REFERENCES homeworks(id) ON DELETE SET NULL,
            lesson_id TEXT REFERENCES lessons(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_coin_transactions_student ON coin_transactions(student_id, created_at)",
    )
    .execute(pool)
    .await?;

    // At most one approval credit per homework record
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_coin_transactions_homework_credit
        ON coin_transactions(homework_id)
        WHERE kind = 'earned' AND homework_id IS NOT NULL
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_leaderboard_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS leaderboard_entries (
            group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
            student_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            rank INTEGER NOT NULL CHECK (rank >= 1),
            coins INTEGER NOT NULL,
            lessons_completed INTEGER NOT NULL,
            homeworks_completed INTEGER NOT NULL,
            attendance_percentage REAL NOT NULL,
            last_updated TEXT NOT NULL,
            PRIMARY KEY (group_id, student_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_payment_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            amount INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'confirmed', 'failed', 'cancelled', 'overdue')),
            due_date TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS payment_history (
            id TEXT PRIMARY KEY,
            payment_id TEXT NOT NULL REFERENCES payments(id) ON DELETE CASCADE,
            old_status TEXT NOT NULL,
            new_status TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
