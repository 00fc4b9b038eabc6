//! Database-level enums shared between services
//!
//! Each enum is stored as its lowercase snake_case name in a TEXT column.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Homework submission lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HomeworkStatus {
    /// Created when a lesson is scheduled, awaiting audio
    Assigned,
    /// Audio received, waiting for the scoring worker
    Submitted,
    /// Needs a teacher decision (scoring failed or was disabled)
    UnderReview,
    /// Passed, coins awarded
    Approved,
    /// Failed the similarity check or rejected by a teacher
    Rejected,
    /// Retry attempt opened after a rejection
    SecondChance,
}

impl HomeworkStatus {
    pub const ALL: [HomeworkStatus; 6] = [
        HomeworkStatus::Assigned,
        HomeworkStatus::Submitted,
        HomeworkStatus::UnderReview,
        HomeworkStatus::Approved,
        HomeworkStatus::Rejected,
        HomeworkStatus::SecondChance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HomeworkStatus::Assigned => "assigned",
            HomeworkStatus::Submitted => "submitted",
            HomeworkStatus::UnderReview => "under_review",
            HomeworkStatus::Approved => "approved",
            HomeworkStatus::Rejected => "rejected",
            HomeworkStatus::SecondChance => "second_chance",
        }
    }
}

impl fmt::Display for HomeworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HomeworkStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HomeworkStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown homework status: {}", s)))
    }
}

/// Coin ledger transaction type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Earned,
    Spent,
    Bonus,
    Penalty,
    Refund,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 5] = [
        TransactionKind::Earned,
        TransactionKind::Spent,
        TransactionKind::Bonus,
        TransactionKind::Penalty,
        TransactionKind::Refund,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Earned => "earned",
            TransactionKind::Spent => "spent",
            TransactionKind::Bonus => "bonus",
            TransactionKind::Penalty => "penalty",
            TransactionKind::Refund => "refund",
        }
    }

    /// Credits increase the balance; debits decrease it
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            TransactionKind::Earned | TransactionKind::Bonus | TransactionKind::Refund
        )
    }

    /// Amount with the sign it contributes to the account total
    pub fn signed(&self, amount: u32) -> i64 {
        if self.is_credit() {
            i64::from(amount)
        } else {
            -i64::from(amount)
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown transaction kind: {}", s)))
    }
}

/// Platform role as resolved by the authorization collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            other => Err(Error::InvalidInput(format!("Unknown role: {}", other))),
        }
    }
}
