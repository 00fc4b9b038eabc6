//! Leaderboard rows

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Ranking inputs gathered for one student of a group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentStanding {
    pub student_id: Uuid,
    pub coins: u32,
    pub lessons_completed: u32,
    pub homeworks_completed: u32,
    pub attendance_percentage: f64,
}

/// Derived per-(group, student) ranking row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub group_id: Uuid,
    pub student_id: Uuid,
    pub rank: u32,
    pub coins: u32,
    pub lessons_completed: u32,
    pub homeworks_completed: u32,
    pub attendance_percentage: f64,
    pub last_updated: DateTime<Utc>,
}
