//! Leaderboard ranker
//!
//! Rankings are derived data: each pass gathers every student's standing
//! for a group and replaces the group's entries in one transaction. A
//! per-group lock keeps two passes for the same group from interleaving.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::cmp::Ordering;
use tracing::{info, warn};
use uuid::Uuid;

use turan_common::events::{EventBus, TuranEvent};
use turan_common::time;

use crate::db::{activity, leaderboard as leaderboard_db};
use crate::error::{HomeworkError, HwResult};
use crate::models::{LeaderboardEntry, StudentStanding};
use crate::utils::KeyedLocks;

/// Ranking order: coins, lessons, homeworks (all descending), then
/// student id ascending so the order is total
pub fn compare_standings(a: &StudentStanding, b: &StudentStanding) -> Ordering {
    b.coins
        .cmp(&a.coins)
        .then_with(|| b.lessons_completed.cmp(&a.lessons_completed))
        .then_with(|| b.homeworks_completed.cmp(&a.homeworks_completed))
        .then_with(|| a.student_id.cmp(&b.student_id))
}

/// Sort standings and assign ranks 1..=N
pub fn rank_standings(
    group_id: Uuid,
    mut standings: Vec<StudentStanding>,
    now: DateTime<Utc>,
) -> Vec<LeaderboardEntry> {
    standings.sort_by(compare_standings);

    standings
        .into_iter()
        .zip(1u32..)
        .map(|(s, rank)| LeaderboardEntry {
            group_id,
            student_id: s.student_id,
            rank,
            coins: s.coins,
            lessons_completed: s.lessons_completed,
            homeworks_completed: s.homeworks_completed,
            attendance_percentage: s.attendance_percentage,
            last_updated: now,
        })
        .collect()
}

/// Leaderboard service
#[derive(Debug)]
pub struct LeaderboardRanker {
    db: SqlitePool,
    events: EventBus,
    group_locks: KeyedLocks<Uuid>,
}

impl LeaderboardRanker {
    pub fn new(db: SqlitePool, events: EventBus) -> Self {
        Self {
            db,
            events,
            group_locks: KeyedLocks::new(),
        }
    }

    /// Rebuild the leaderboard of one group
    pub async fn recompute(&self, group_id: Uuid) -> HwResult<Vec<LeaderboardEntry>> {
        if !activity::group_exists(&self.db, group_id).await? {
            return Err(HomeworkError::NotFound(format!("Group {}", group_id)));
        }

        let _barrier = self.group_locks.lock(group_id).await;

        let students = activity::group_students(&self.db, group_id).await?;
        let mut standings = Vec::with_capacity(students.len());
        for student_id in students {
            standings.push(activity::student_standing(&self.db, group_id, student_id).await?);
        }

        let entries = rank_standings(group_id, standings, time::now());

        let mut tx = self.db.begin().await?;
        leaderboard_db::replace_group_entries(&mut tx, group_id, &entries).await?;
        tx.commit().await?;

        info!(group_id = %group_id, entries = entries.len(), "Leaderboard recomputed");
        self.events.emit_lossy(TuranEvent::LeaderboardRecomputed {
            group_id,
            entries: entries.len(),
            timestamp: time::now(),
        });

        Ok(entries)
    }

    /// Rebuild every group; failures are logged and skipped
    ///
    /// Returns the number of groups rebuilt.
    pub async fn recompute_all(&self) -> HwResult<usize> {
        let groups = activity::all_group_ids(&self.db).await?;
        let mut rebuilt = 0;

        for group_id in groups {
            match self.recompute(group_id).await {
                Ok(_) => rebuilt += 1,
                Err(e) => warn!(group_id = %group_id, "Leaderboard recompute failed: {}", e),
            }
        }

        Ok(rebuilt)
    }

    /// Stored entries for a group, by rank
    pub async fn snapshot(&self, group_id: Uuid) -> HwResult<Vec<LeaderboardEntry>> {
        if !activity::group_exists(&self.db, group_id).await? {
            return Err(HomeworkError::NotFound(format!("Group {}", group_id)));
        }
        Ok(leaderboard_db::load_group_entries(&self.db, group_id).await?)
    }
}
