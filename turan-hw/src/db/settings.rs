//! Settings database operations
//!
//! Key-value access to the `settings` table. Values are stored as text and
//! parsed on read.

use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use turan_common::{time, Error, Result};

/// Generic setting getter
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((value,)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting {} failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Generic setting setter (upsert)
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(value.to_string())
    .bind(time::to_db(&time::now()))
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

/// Write defaults for keys that are not yet present
///
/// Returns the number of keys written.
pub async fn insert_missing(db: &Pool<Sqlite>, defaults: &[(&str, String)]) -> Result<u64> {
    let now = time::to_db(&time::now());
    let mut written = 0;

    for (key, value) in defaults {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO settings (key, value, updated_at) VALUES (?, ?, ?)",
        )
        .bind(key)
        .bind(value)
        .bind(&now)
        .execute(db)
        .await
        .map_err(Error::Database)?;
        written += result.rows_affected();
    }

    Ok(written)
}

/// Load every setting as raw text
pub async fn load_all(db: &Pool<Sqlite>) -> Result<HashMap<String, String>> {
    let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM settings")
        .fetch_all(db)
        .await
        .map_err(Error::Database)?;

    Ok(rows.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_get_missing_setting() {
        let (_dir, pool) = test_pool().await;

        let result: Option<f64> = get_setting(&pool, "similarity_threshold").await.unwrap();

        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_set_then_update_setting() {
        let (_dir, pool) = test_pool().await;

        set_setting(&pool, "homework_approved_coins", 10).await.unwrap();
        set_setting(&pool, "homework_approved_coins", 15).await.unwrap();

        let value: Option<u32> = get_setting(&pool, "homework_approved_coins").await.unwrap();
        assert_eq!(value, Some(15));
    }

    #[tokio::test]
    async fn test_unparseable_setting_is_config_error() {
        let (_dir, pool) = test_pool().await;
        set_setting(&pool, "scoring_workers", "many").await.unwrap();

        let result: Result<Option<usize>> = get_setting(&pool, "scoring_workers").await;

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_insert_missing_keeps_existing_values() {
        let (_dir, pool) = test_pool().await;
        set_setting(&pool, "max_homework_attempts", 5).await.unwrap();

        let written = insert_missing(
            &pool,
            &[
                ("max_homework_attempts", "3".to_string()),
                ("homework_deadline_hours", "24".to_string()),
            ],
        )
        .await
        .unwrap();

        assert_eq!(written, 1);
        let all = load_all(&pool).await.unwrap();
        assert_eq!(all.get("max_homework_attempts").map(String::as_str), Some("5"));
        assert_eq!(all.get("homework_deadline_hours").map(String::as_str), Some("24"));
    }
}
