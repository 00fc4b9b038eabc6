//! Event types and broadcast bus for TuranTalim services
//!
//! Events are emitted after state has been committed. Consumers (the
//! notification fan-out, SSE clients, dashboards) subscribe through
//! [`EventBus::subscribe`]; nothing in the core waits on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::db::models::{HomeworkStatus, TransactionKind};

/// TuranTalim event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TuranEvent {
    /// A homework record was created in `assigned` or `second_chance`
    HomeworkAssigned {
        homework_id: Uuid,
        lesson_id: Uuid,
        student_id: Uuid,
        attempt_number: u32,
        deadline: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// Audio accepted and a scoring job queued
    HomeworkSubmitted {
        homework_id: Uuid,
        student_id: Uuid,
        is_late: bool,
        timestamp: DateTime<Utc>,
    },

    /// Completion event, emitted after every homework status transition
    HomeworkTransitioned {
        homework_id: Uuid,
        student_id: Uuid,
        outcome: HomeworkStatus,
        coins_awarded: u32,
        timestamp: DateTime<Utc>,
    },

    /// Coins added to a student account
    CoinsCredited {
        student_id: Uuid,
        kind: TransactionKind,
        amount: u32,
        balance: u32,
        homework_id: Option<Uuid>,
        timestamp: DateTime<Utc>,
    },

    /// Coins removed from a student account
    CoinsDebited {
        student_id: Uuid,
        kind: TransactionKind,
        amount: u32,
        balance: u32,
        timestamp: DateTime<Utc>,
    },

    /// An account failed its consistency check and was frozen
    LedgerInvariantViolated {
        student_id: Uuid,
        detail: String,
        timestamp: DateTime<Utc>,
    },

    /// A group's leaderboard was rebuilt
    LeaderboardRecomputed {
        group_id: Uuid,
        entries: usize,
        timestamp: DateTime<Utc>,
    },

    /// A pending homework is close to its deadline
    DeadlineApproaching {
        homework_id: Uuid,
        student_id: Uuid,
        deadline: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// Pending payments past their grace period were marked overdue
    PaymentsMarkedOverdue {
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Runtime settings were reloaded
    SettingsReloaded {
        timestamp: DateTime<Utc>,
    },
}

impl TuranEvent {
    /// Event name used for SSE `event:` lines
    pub fn event_type(&self) -> &'static str {
        match self {
            TuranEvent::HomeworkAssigned { .. } => "HomeworkAssigned",
            TuranEvent::HomeworkSubmitted { .. } => "HomeworkSubmitted",
            TuranEvent::HomeworkTransitioned { .. } => "HomeworkTransitioned",
            TuranEvent::CoinsCredited { .. } => "CoinsCredited",
            TuranEvent::CoinsDebited { .. } => "CoinsDebited",
            TuranEvent::LedgerInvariantViolated { .. } => "LedgerInvariantViolated",
            TuranEvent::LeaderboardRecomputed { .. } => "LeaderboardRecomputed",
            TuranEvent::DeadlineApproaching { .. } => "DeadlineApproaching",
            TuranEvent::PaymentsMarkedOverdue { .. } => "PaymentsMarkedOverdue",
            TuranEvent::SettingsReloaded { .. } => "SettingsReloaded",
        }
    }
}

/// Broadcast bus for [`TuranEvent`]s
///
/// Cloning is cheap; all clones share one channel.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<TuranEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<TuranEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: TuranEvent,
    ) -> Result<usize, broadcast::error::SendError<TuranEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the case where nobody is listening
    pub fn emit_lossy(&self, event: TuranEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
