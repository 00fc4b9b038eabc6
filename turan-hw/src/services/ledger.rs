//! Coin ledger
//!
//! Owns the append-only transaction log and the derived per-student balance.
//! Every mutation runs under the student's lock and inside a database
//! transaction that appends the log entry and updates the balance together.
//!
//! Before mutating, the account is checked against `total == earned - spent`.
//! A failed check freezes the account: nothing is auto-corrected, further
//! mutation is refused, and a `LedgerInvariantViolated` event is raised.

use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

use turan_common::db::TransactionKind;
use turan_common::events::{EventBus, TuranEvent};
use turan_common::time;

use crate::db::coins as coins_db;
use crate::error::{HomeworkError, HwResult};
use crate::models::{CoinAccount, CoinTransaction, TransactionLinks};
use crate::utils::{retry_on_lock, KeyGuard, KeyedLocks};

/// Held per-student ledger lock
pub type LedgerGuard = KeyGuard<Uuid>;

/// Reason recorded for homework approval credits
pub const HOMEWORK_CREDIT_REASON: &str = "Homework approved";

const LOCK_WAIT_MS: u64 = 5000;

/// A transaction written inside the caller's database transaction
///
/// Pass it to [`CoinLedger::announce`] once the transaction has committed.
#[derive(Debug, Clone)]
pub struct PostedTransaction {
    pub transaction: CoinTransaction,
    pub balance: u32,
}

/// Result of comparing an account with its transaction log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub account: CoinAccount,
    pub log_credits: i64,
    pub log_debits: i64,
    pub consistent: bool,
}

/// Ledger service
#[derive(Debug)]
pub struct CoinLedger {
    db: SqlitePool,
    events: EventBus,
    locks: KeyedLocks<Uuid>,
    frozen: Mutex<HashSet<Uuid>>,
}

impl CoinLedger {
    pub fn new(db: SqlitePool, events: EventBus) -> Self {
        Self {
            db,
            events,
            locks: KeyedLocks::new(),
            frozen: Mutex::new(HashSet::new()),
        }
    }

    /// Take the single-writer lock for one student's account
    pub async fn lock_account(&self, student_id: Uuid) -> LedgerGuard {
        self.locks.lock(student_id).await
    }

    /// Award coins (`earned`)
    pub async fn credit(
        &self,
        student_id: Uuid,
        amount: u32,
        reason: &str,
        links: TransactionLinks,
    ) -> HwResult<CoinTransaction> {
        self.post(student_id, TransactionKind::Earned, amount, reason, links).await
    }

    /// Spend coins (`spent`)
    pub async fn debit(
        &self,
        student_id: Uuid,
        amount: u32,
        reason: &str,
        links: TransactionLinks,
    ) -> HwResult<CoinTransaction> {
        self.post(student_id, TransactionKind::Spent, amount, reason, links).await
    }

    /// Post a transaction of any kind in its own database transaction
    pub async fn post(
        &self,
        student_id: Uuid,
        kind: TransactionKind,
        amount: u32,
        reason: &str,
        links: TransactionLinks,
    ) -> HwResult<CoinTransaction> {
        let result = retry_on_lock("coin ledger post", LOCK_WAIT_MS, move || {
            self.post_once(student_id, kind, amount, reason, links)
        })
        .await;

        match result {
            Ok(posted) => {
                self.announce(&posted);
                Ok(posted.transaction)
            }
            Err(err) => {
                self.after_rollback(student_id, &err).await;
                Err(err)
            }
        }
    }

    async fn post_once(
        &self,
        student_id: Uuid,
        kind: TransactionKind,
        amount: u32,
        reason: &str,
        links: TransactionLinks,
    ) -> HwResult<PostedTransaction> {
        let guard = self.lock_account(student_id).await;
        let mut tx = self.db.begin().await?;
        let posted = self
            .post_in(&mut tx, &guard, kind, amount, reason, links)
            .await?;
        tx.commit().await?;
        Ok(posted)
    }

    /// Append a transaction and update the balance inside `conn`'s transaction
    ///
    /// The caller holds `guard` for the student and must commit before
    /// calling [`announce`](Self::announce).
    pub async fn post_in(
        &self,
        conn: &mut SqliteConnection,
        guard: &LedgerGuard,
        kind: TransactionKind,
        amount: u32,
        reason: &str,
        links: TransactionLinks,
    ) -> HwResult<PostedTransaction> {
        let student_id = *guard.key();

        if amount == 0 {
            return Err(HomeworkError::Validation(
                "Transaction amount must be positive".to_string(),
            ));
        }

        let mut account = self.checked_account(conn, student_id).await?;
        let now = time::now();

        if kind.is_credit() {
            let total = account.total.checked_add(amount);
            let earned = account.earned.checked_add(amount);
            match (total, earned) {
                (Some(total), Some(earned)) => {
                    account.total = total;
                    account.earned = earned;
                }
                _ => {
                    return Err(HomeworkError::Validation(format!(
                        "Credit of {} would overflow the balance",
                        amount
                    )))
                }
            }
        } else {
            if amount > account.total {
                return Err(HomeworkError::InsufficientFunds {
                    requested: amount,
                    available: account.total,
                });
            }
            account.total -= amount;
            account.spent = account.spent.checked_add(amount).ok_or_else(|| {
                HomeworkError::Validation(format!("Debit of {} would overflow spent", amount))
            })?;
        }
        account.updated_at = now;

        let transaction = CoinTransaction {
            id: Uuid::new_v4(),
            student_id,
            kind,
            amount,
            reason: reason.to_string(),
            homework_id: links.homework_id,
            lesson_id: links.lesson_id,
            created_at: now,
        };

        coins_db::insert_transaction(&mut *conn, &transaction).await?;
        coins_db::store_balance(&mut *conn, &account).await?;

        Ok(PostedTransaction {
            transaction,
            balance: account.total,
        })
    }

    /// Credit the approval reward for a homework record at most once
    ///
    /// Returns `None` when the record already has a credit or the reward is 0.
    pub async fn credit_homework_in(
        &self,
        conn: &mut SqliteConnection,
        guard: &LedgerGuard,
        homework_id: Uuid,
        lesson_id: Uuid,
        amount: u32,
    ) -> HwResult<Option<PostedTransaction>> {
        if amount == 0 {
            return Ok(None);
        }
        if coins_db::has_homework_credit(&mut *conn, homework_id).await? {
            info!(homework_id = %homework_id, "Homework already credited, skipping");
            return Ok(None);
        }

        let posted = self
            .post_in(
                conn,
                guard,
                TransactionKind::Earned,
                amount,
                HOMEWORK_CREDIT_REASON,
                TransactionLinks::homework(homework_id, lesson_id),
            )
            .await?;
        Ok(Some(posted))
    }

    /// Emit the event for a committed transaction
    pub fn announce(&self, posted: &PostedTransaction) {
        let tx = &posted.transaction;
        let event = if tx.kind.is_credit() {
            TuranEvent::CoinsCredited {
                student_id: tx.student_id,
                kind: tx.kind,
                amount: tx.amount,
                balance: posted.balance,
                homework_id: tx.homework_id,
                timestamp: tx.created_at,
            }
        } else {
            TuranEvent::CoinsDebited {
                student_id: tx.student_id,
                kind: tx.kind,
                amount: tx.amount,
                balance: posted.balance,
                timestamp: tx.created_at,
            }
        };
        self.events.emit_lossy(event);
    }

    /// Persist a freeze once the failed database transaction is gone
    ///
    /// No-op unless `err` is a ledger invariant violation.
    pub async fn after_rollback(&self, student_id: Uuid, err: &HomeworkError) {
        if !matches!(err, HomeworkError::LedgerInvariant(_)) {
            return;
        }
        if let Err(e) = coins_db::set_frozen(&self.db, student_id, true, time::now()).await {
            error!(student_id = %student_id, "Failed to persist account freeze: {}", e);
        }
    }

    /// Current account (created empty on first reference)
    pub async fn account(&self, student_id: Uuid) -> HwResult<CoinAccount> {
        coins_db::ensure_account(&self.db, student_id, time::now()).await?;
        coins_db::load_account(&self.db, student_id)
            .await?
            .ok_or_else(|| HomeworkError::NotFound(format!("Coin account {}", student_id)))
    }

    /// Transaction history, newest first
    pub async fn transactions(&self, student_id: Uuid) -> HwResult<Vec<CoinTransaction>> {
        Ok(coins_db::list_transactions(&self.db, student_id).await?)
    }

    /// Compare the account with its transaction log, freezing on mismatch
    pub async fn reconcile(&self, student_id: Uuid) -> HwResult<Reconciliation> {
        let _guard = self.lock_account(student_id).await;

        let account = self.account(student_id).await?;
        let totals = coins_db::transaction_totals(&self.db, student_id).await?;

        let consistent = account.is_consistent()
            && totals.credits == i64::from(account.earned)
            && totals.debits == i64::from(account.spent)
            && totals.net() == i64::from(account.total);

        if !consistent && !account.frozen {
            let detail = format!(
                "account total={} earned={} spent={}, log credits={} debits={}",
                account.total, account.earned, account.spent, totals.credits, totals.debits
            );
            self.raise_violation(student_id, &detail);
            coins_db::set_frozen(&self.db, student_id, true, time::now()).await?;
        }

        let account = coins_db::load_account(&self.db, student_id)
            .await?
            .unwrap_or(account);

        Ok(Reconciliation {
            account,
            log_credits: totals.credits,
            log_debits: totals.debits,
            consistent,
        })
    }

    /// Whether mutation of this account is blocked
    pub fn is_frozen(&self, student_id: Uuid) -> bool {
        self.frozen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&student_id)
    }

    async fn checked_account(
        &self,
        conn: &mut SqliteConnection,
        student_id: Uuid,
    ) -> HwResult<CoinAccount> {
        coins_db::ensure_account(&mut *conn, student_id, time::now()).await?;
        let account = coins_db::load_account(&mut *conn, student_id)
            .await?
            .ok_or_else(|| HomeworkError::NotFound(format!("Coin account {}", student_id)))?;

        if account.frozen || self.is_frozen(student_id) {
            return Err(HomeworkError::LedgerInvariant(format!(
                "Account {} is frozen pending investigation",
                student_id
            )));
        }

        if !account.is_consistent() {
            let detail = format!(
                "total={} earned={} spent={}",
                account.total, account.earned, account.spent
            );
            self.raise_violation(student_id, &detail);
            return Err(HomeworkError::LedgerInvariant(format!(
                "Account {} is inconsistent: {}",
                student_id, detail
            )));
        }

        Ok(account)
    }

    fn raise_violation(&self, student_id: Uuid, detail: &str) {
        self.frozen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(student_id);

        error!(
            student_id = %student_id,
            detail,
            "Ledger invariant violated, account frozen"
        );
        self.events.emit_lossy(TuranEvent::LedgerInvariantViolated {
            student_id,
            detail: detail.to_string(),
            timestamp: time::now(),
        });
    }
}
