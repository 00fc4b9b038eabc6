//! Payment status sweep
//!
//! Payment processing itself lives elsewhere; this service only moves
//! stale `pending` payments to `overdue` and records the change.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use turan_common::{time, Result};

use super::parse_uuid;

/// History note written for every automatic transition
pub const OVERDUE_NOTE: &str = "Automatically marked as overdue";

/// Mark pending payments due before `cutoff` as overdue
///
/// Returns the ids of the payments that changed.
pub async fn mark_overdue_before(
    conn: &mut SqliteConnection,
    cutoff: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Vec<Uuid>> {
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT id FROM payments WHERE status = 'pending' AND due_date < ? ORDER BY due_date ASC",
    )
    .bind(time::date_to_db(&cutoff))
    .fetch_all(&mut *conn)
    .await?;

    let stamp = time::to_db(&now);
    let mut changed = Vec::with_capacity(ids.len());

    for id in ids {
        let result = sqlx::query(
            "UPDATE payments SET status = 'overdue', updated_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(&stamp)
        .bind(&id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            continue;
        }

        sqlx::query(
            "INSERT INTO payment_history (id, payment_id, old_status, new_status, notes, created_at) \
             VALUES (?, ?, 'pending', 'overdue', ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&id)
        .bind(OVERDUE_NOTE)
        .bind(&stamp)
        .execute(&mut *conn)
        .await?;

        changed.push(parse_uuid(&id)?);
    }

    Ok(changed)
}
