//! Database access for turan-hw
//!
//! Thin query functions over the shared SQLite schema created by
//! `turan_common::db::init`. UUIDs are stored as TEXT and timestamps as
//! fixed-width RFC 3339 TEXT, so string comparison orders them correctly.

pub mod activity;
pub mod coins;
pub mod homeworks;
pub mod leaderboard;
pub mod payments;
pub mod settings;
pub mod transcripts;

use uuid::Uuid;
use turan_common::{Error, Result};

/// Parse a TEXT column holding a UUID
pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Invalid UUID in database '{}': {}", value, e)))
}

pub(crate) fn parse_uuid_opt(value: Option<String>) -> Result<Option<Uuid>> {
    value.as_deref().map(parse_uuid).transpose()
}

/// Convert a non-negative INTEGER column to u32
pub(crate) fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::Internal(format!("Column {} out of range: {}", column, value)))
}

#[cfg(test)]
pub(crate) async fn test_pool() -> (tempfile::TempDir, sqlx::SqlitePool) {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let pool = turan_common::db::init_database(&dir.path().join("turan.db"))
        .await
        .expect("init database");
    (dir, pool)
}
