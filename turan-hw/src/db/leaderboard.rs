//! Leaderboard entry persistence

use sqlx::{Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use turan_common::{time, Result};

use super::{parse_uuid, to_u32};
use crate::models::LeaderboardEntry;

/// Replace every entry of `group_id` with `entries`
///
/// Callers run this inside a transaction so readers never see a mix of
/// old and new ranks.
pub async fn replace_group_entries(
    conn: &mut SqliteConnection,
    group_id: Uuid,
    entries: &[LeaderboardEntry],
) -> Result<()> {
    sqlx::query("DELETE FROM leaderboard_entries WHERE group_id = ?")
        .bind(group_id.to_string())
        .execute(&mut *conn)
        .await?;

    for entry in entries {
        sqlx::query(
            r#"
            INSERT INTO leaderboard_entries (
                group_id, student_id, rank, coins, lessons_completed,
                homeworks_completed, attendance_percentage, last_updated
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.group_id.to_string())
        .bind(entry.student_id.to_string())
        .bind(i64::from(entry.rank))
        .bind(i64::from(entry.coins))
        .bind(i64::from(entry.lessons_completed))
        .bind(i64::from(entry.homeworks_completed))
        .bind(entry.attendance_percentage)
        .bind(time::to_db(&entry.last_updated))
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// A group's entries ordered by rank
pub async fn load_group_entries<'e, E>(executor: E, group_id: Uuid) -> Result<Vec<LeaderboardEntry>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        "SELECT group_id, student_id, rank, coins, lessons_completed, homeworks_completed, \
         attendance_percentage, last_updated FROM leaderboard_entries WHERE group_id = ? ORDER BY rank ASC",
    )
    .bind(group_id.to_string())
    .fetch_all(executor)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(LeaderboardEntry {
                group_id: parse_uuid(row.get("group_id"))?,
                student_id: parse_uuid(row.get("student_id"))?,
                rank: to_u32(row.get("rank"), "rank")?,
                coins: to_u32(row.get("coins"), "coins")?,
                lessons_completed: to_u32(row.get("lessons_completed"), "lessons_completed")?,
                homeworks_completed: to_u32(row.get("homeworks_completed"), "homeworks_completed")?,
                attendance_percentage: row.get("attendance_percentage"),
                last_updated: time::from_db(row.get("last_updated"))?,
            })
        })
        .collect()
}
