//! Deadline sweep scheduler
//!
//! Three periodic jobs share one task: deadline reminders, the daily payment
//! overdue sweep and the hourly leaderboard refresh. Each job can also be
//! invoked directly, which is how tests and admin tooling drive them.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use turan_common::events::{EventBus, TuranEvent};
use turan_common::time;

use crate::config::SettingsHandle;
use crate::db::{homeworks as homeworks_db, payments as payments_db};
use crate::error::{HomeworkError, HwResult};
use crate::services::leaderboard::LeaderboardRanker;

/// Cadence of the three sweep jobs
#[derive(Debug, Clone, Copy)]
pub struct SweepIntervals {
    pub deadline_check: Duration,
    pub overdue_payments: Duration,
    pub leaderboard_refresh: Duration,
}

impl Default for SweepIntervals {
    fn default() -> Self {
        Self {
            deadline_check: Duration::from_secs(15 * 60),
            overdue_payments: Duration::from_secs(24 * 60 * 60),
            leaderboard_refresh: Duration::from_secs(60 * 60),
        }
    }
}

pub struct SweepScheduler {
    db: SqlitePool,
    settings: SettingsHandle,
    ranker: Arc<LeaderboardRanker>,
    events: EventBus,
    intervals: SweepIntervals,
    started: AtomicBool,
    /// Deadlines up to this instant have already been announced
    reminded_until: Mutex<Option<DateTime<Utc>>>,
}

impl SweepScheduler {
    pub fn new(
        db: SqlitePool,
        settings: SettingsHandle,
        ranker: Arc<LeaderboardRanker>,
        events: EventBus,
        intervals: SweepIntervals,
    ) -> Self {
        Self {
            db,
            settings,
            ranker,
            events,
            intervals,
            started: AtomicBool::new(false),
            reminded_until: Mutex::new(None),
        }
    }

    /// Spawn the sweep loop
    ///
    /// Each job first fires one full period after start. Fails if this
    /// scheduler has already been started.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> HwResult<JoinHandle<()>> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(HomeworkError::InvalidState(
                "Sweep scheduler is already running".to_string(),
            ));
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let ticker = |period: Duration| {
                let mut interval = interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                interval
            };
            let mut deadlines = ticker(this.intervals.deadline_check);
            let mut payments = ticker(this.intervals.overdue_payments);
            let mut leaderboards = ticker(this.intervals.leaderboard_refresh);

            info!(
                deadline_check_secs = this.intervals.deadline_check.as_secs(),
                overdue_payments_secs = this.intervals.overdue_payments.as_secs(),
                leaderboard_refresh_secs = this.intervals.leaderboard_refresh.as_secs(),
                "Sweep scheduler started"
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Sweep scheduler stopping");
                        break;
                    }
                    _ = deadlines.tick() => {
                        if let Err(e) = this.check_deadlines(time::now()).await {
                            error!("Deadline check failed: {}", e);
                        }
                    }
                    _ = payments.tick() => {
                        if let Err(e) = this.mark_overdue_payments(Utc::now().date_naive()).await {
                            error!("Overdue payment sweep failed: {}", e);
                        }
                    }
                    _ = leaderboards.tick() => {
                        if let Err(e) = this.refresh_leaderboards().await {
                            error!("Leaderboard refresh failed: {}", e);
                        }
                    }
                }
            }
        });

        Ok(handle)
    }

    /// Emit `DeadlineApproaching` for open records due within the reminder window
    ///
    /// A record is announced once even though consecutive windows overlap.
    pub async fn check_deadlines(&self, now: DateTime<Utc>) -> HwResult<usize> {
        let window = i64::from(self.settings.current().deadline_reminder_window_minutes);
        let until = now + ChronoDuration::minutes(window);

        let from = {
            let reminded = self
                .reminded_until
                .lock()
                .map_err(|_| HomeworkError::InvalidState("reminder state poisoned".to_string()))?;
            match *reminded {
                Some(previous) if previous > now => previous,
                _ => now,
            }
        };
        if from >= until {
            return Ok(0);
        }

        let due = homeworks_db::open_with_deadline_between(&self.db, from, until).await?;

        for hw in &due {
            self.events.emit_lossy(TuranEvent::DeadlineApproaching {
                homework_id: hw.id,
                student_id: hw.student_id,
                deadline: hw.deadline,
                timestamp: now,
            });
        }

        if let Ok(mut reminded) = self.reminded_until.lock() {
            *reminded = Some(until);
        }

        debug!(count = due.len(), window_minutes = window, "Deadline check complete");
        Ok(due.len())
    }

    /// Move pending payments older than `overdue_payment_days` to `overdue`
    pub async fn mark_overdue_payments(&self, today: NaiveDate) -> HwResult<usize> {
        let days = i64::from(self.settings.current().overdue_payment_days);
        let cutoff = today - ChronoDuration::days(days);
        let now = time::now();

        let mut tx = self.db.begin().await?;
        let changed = payments_db::mark_overdue_before(&mut tx, cutoff, now).await?;
        tx.commit().await?;

        if !changed.is_empty() {
            warn!(count = changed.len(), cutoff = %cutoff, "Payments marked overdue");
            self.events.emit_lossy(TuranEvent::PaymentsMarkedOverdue {
                count: changed.len(),
                timestamp: now,
            });
        }
        Ok(changed.len())
    }

    /// Recompute every group's leaderboard
    pub async fn refresh_leaderboards(&self) -> HwResult<usize> {
        let groups = self.ranker.recompute_all().await?;
        debug!(groups, "Leaderboards refreshed");
        Ok(groups)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }
}
