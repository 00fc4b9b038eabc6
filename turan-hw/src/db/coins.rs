//! Coin account and transaction persistence
//!
//! Only the ledger service calls the mutating functions here, always inside
//! a transaction and under the per-student lock.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite};
use uuid::Uuid;

use turan_common::{time, Result};

use super::{parse_uuid, parse_uuid_opt, to_u32};
use crate::models::{CoinAccount, CoinTransaction};

fn row_to_account(row: &SqliteRow) -> Result<CoinAccount> {
    Ok(CoinAccount {
        student_id: parse_uuid(row.get("student_id"))?,
        total: to_u32(row.get("total"), "total")?,
        earned: to_u32(row.get("earned"), "earned")?,
        spent: to_u32(row.get("spent"), "spent")?,
        frozen: row.get::<i64, _>("frozen") != 0,
        updated_at: time::from_db(row.get("updated_at"))?,
    })
}

fn row_to_transaction(row: &SqliteRow) -> Result<CoinTransaction> {
    let kind: String = row.get("kind");
    Ok(CoinTransaction {
        id: parse_uuid(row.get("id"))?,
        student_id: parse_uuid(row.get("student_id"))?,
        kind: kind.parse()?,
        amount: to_u32(row.get("amount"), "amount")?,
        reason: row.get("reason"),
        homework_id: parse_uuid_opt(row.get("homework_id"))?,
        lesson_id: parse_uuid_opt(row.get("lesson_id"))?,
        created_at: time::from_db(row.get("created_at"))?,
    })
}

/// Create an empty account if none exists
pub async fn ensure_account<'e, E>(executor: E, student_id: Uuid, now: DateTime<Utc>) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT OR IGNORE INTO coin_accounts (student_id, total, earned, spent, frozen, updated_at) \
         VALUES (?, 0, 0, 0, 0, ?)",
    )
    .bind(student_id.to_string())
    .bind(time::to_db(&now))
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn load_account<'e, E>(executor: E, student_id: Uuid) -> Result<Option<CoinAccount>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        "SELECT student_id, total, earned, spent, frozen, updated_at FROM coin_accounts WHERE student_id = ?",
    )
    .bind(student_id.to_string())
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(row_to_account).transpose()
}

/// Write balance fields back
pub async fn store_balance<'e, E>(executor: E, account: &CoinAccount) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE coin_accounts SET total = ?, earned = ?, spent = ?, updated_at = ? WHERE student_id = ?",
    )
    .bind(i64::from(account.total))
    .bind(i64::from(account.earned))
    .bind(i64::from(account.spent))
    .bind(time::to_db(&account.updated_at))
    .bind(account.student_id.to_string())
    .execute(executor)
    .await?;
    Ok(())
}

/// Set or clear the frozen flag (creates the account row if missing)
pub async fn set_frozen<'e, E>(executor: E, student_id: Uuid, frozen: bool, now: DateTime<Utc>) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO coin_accounts (student_id, total, earned, spent, frozen, updated_at)
        VALUES (?, 0, 0, 0, ?, ?)
        ON CONFLICT(student_id) DO UPDATE SET frozen = excluded.frozen, updated_at = excluded.updated_at
        "#,
    )
    .bind(student_id.to_string())
    .bind(frozen as i64)
    .bind(time::to_db(&now))
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn insert_transaction<'e, E>(executor: E, tx: &CoinTransaction) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO coin_transactions (id, student_id, kind, amount, reason, homework_id, lesson_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(tx.id.to_string())
    .bind(tx.student_id.to_string())
    .bind(tx.kind.as_str())
    .bind(i64::from(tx.amount))
    .bind(&tx.reason)
    .bind(tx.homework_id.map(|id| id.to_string()))
    .bind(tx.lesson_id.map(|id| id.to_string()))
    .bind(time::to_db(&tx.created_at))
    .execute(executor)
    .await?;
    Ok(())
}

/// Whether an approval credit already exists for this homework record
pub async fn has_homework_credit<'e, E>(executor: E, homework_id: Uuid) -> Result<bool>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM coin_transactions WHERE homework_id = ? AND kind = 'earned'",
    )
    .bind(homework_id.to_string())
    .fetch_one(executor)
    .await?;
    Ok(count > 0)
}

/// A student's transactions, newest first
pub async fn list_transactions<'e, E>(executor: E, student_id: Uuid) -> Result<Vec<CoinTransaction>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        "SELECT id, student_id, kind, amount, reason, homework_id, lesson_id, created_at \
         FROM coin_transactions WHERE student_id = ? ORDER BY created_at DESC, rowid DESC",
    )
    .bind(student_id.to_string())
    .fetch_all(executor)
    .await?;

    rows.iter().map(row_to_transaction).collect()
}

/// Sums of credits and debits over a student's transaction log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionTotals {
    pub credits: i64,
    pub debits: i64,
}

impl TransactionTotals {
    pub fn net(&self) -> i64 {
        self.credits - self.debits
    }
}

pub async fn transaction_totals<'e, E>(executor: E, student_id: Uuid) -> Result<TransactionTotals>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN kind IN ('earned', 'bonus', 'refund') THEN amount ELSE 0 END), 0) AS credits,
            COALESCE(SUM(CASE WHEN kind IN ('spent', 'penalty') THEN amount ELSE 0 END), 0) AS debits
        FROM coin_transactions WHERE student_id = ?
        "#,
    )
    .bind(student_id.to_string())
    .fetch_one(executor)
    .await?;

    Ok(TransactionTotals {
        credits: row.get("credits"),
        debits: row.get("debits"),
    })
}
