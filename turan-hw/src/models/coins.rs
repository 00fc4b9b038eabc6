//! Coin account and ledger transaction records

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use turan_common::db::TransactionKind;

/// Per-student balance, derived from the transaction log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoinAccount {
    pub student_id: Uuid,
    pub total: u32,
    pub earned: u32,
    pub spent: u32,
    /// Set when the account failed a consistency check; blocks mutation
    pub frozen: bool,
    pub updated_at: DateTime<Utc>,
}

impl CoinAccount {
    /// total == earned - spent (total is unsigned, so also never negative)
    pub fn is_consistent(&self) -> bool {
        i64::from(self.total) == i64::from(self.earned) - i64::from(self.spent)
    }
}

/// Append-only ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoinTransaction {
    pub id: Uuid,
    pub student_id: Uuid,
    pub kind: TransactionKind,
    pub amount: u32,
    pub reason: String,
    pub homework_id: Option<Uuid>,
    pub lesson_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl CoinTransaction {
    /// Amount with the sign of its effect on the balance
    pub fn signed_amount(&self) -> i64 {
        self.kind.signed(self.amount)
    }
}

/// Optional links from a transaction to what triggered it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionLinks {
    pub homework_id: Option<Uuid>,
    pub lesson_id: Option<Uuid>,
}

impl TransactionLinks {
    pub fn homework(homework_id: Uuid, lesson_id: Uuid) -> Self {
        Self {
            homework_id: Some(homework_id),
            lesson_id: Some(lesson_id),
        }
    }
}
