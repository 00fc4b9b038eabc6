//! Health check endpoint
//!
//! Reports the pipeline as well as liveness: database reachability, scoring
//! queue depth, records waiting on a worker or a teacher, and whether the
//! sweep scheduler is running.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use turan_common::db::HomeworkStatus;

use crate::db::homeworks;
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the database or scoring queue is unavailable
    pub status: String,
    /// Module name ("turan-hw")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    pub database: ComponentState,
    pub scoring: ScoringHealth,
    pub scheduler_started: bool,
    /// Last error message if any (for diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Ok,
    Unavailable,
}

/// Scoring pipeline snapshot
#[derive(Debug, Serialize)]
pub struct ScoringHealth {
    /// False once the worker pool stopped consuming
    pub queue_open: bool,
    /// Jobs waiting for a worker
    pub queue_depth: usize,
    /// Jobs the queue can still accept without waiting
    pub queue_capacity: usize,
    /// Records in `submitted` (queued or being scored)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awaiting_scoring: Option<u64>,
    /// Records in `under_review`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awaiting_review: Option<u64>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let counts = async {
        let submitted = homeworks::count_by_status(&state.db, HomeworkStatus::Submitted).await?;
        let under_review = homeworks::count_by_status(&state.db, HomeworkStatus::UnderReview).await?;
        Ok::<_, turan_common::Error>((submitted, under_review))
    }
    .await;

    let (database, awaiting_scoring, awaiting_review) = match counts {
        Ok((submitted, under_review)) => (ComponentState::Ok, Some(submitted), Some(under_review)),
        Err(e) => {
            warn!("Health check could not query the database: {}", e);
            (ComponentState::Unavailable, None, None)
        }
    };

    let scoring = ScoringHealth {
        queue_open: !state.intake.queue_closed(),
        queue_depth: state.intake.queue_depth(),
        queue_capacity: state.intake.queue_capacity(),
        awaiting_scoring,
        awaiting_review,
    };

    let status = if database == ComponentState::Ok && scoring.queue_open {
        "ok"
    } else {
        "degraded"
    };

    let last_error = state.last_error.read().await.clone();

    Json(HealthResponse {
        status: status.to_string(),
        module: "turan-hw".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        database,
        scoring,
        scheduler_started: state.scheduler.is_started(),
        last_error,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
