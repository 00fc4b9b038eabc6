//! Leaderboard endpoints

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use super::auth::AuthenticatedCaller;
use crate::error::ApiResult;
use crate::models::LeaderboardEntry;
use crate::services::Capabilities;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub group_id: Uuid,
    pub entries: Vec<LeaderboardEntry>,
}

/// GET /groups/:id/leaderboard
///
/// Last computed snapshot; recompute first for fresh standings.
pub async fn get_leaderboard(
    State(state): State<AppState>,
    AuthenticatedCaller(_caller): AuthenticatedCaller,
    Path(group_id): Path<Uuid>,
) -> ApiResult<Json<LeaderboardResponse>> {
    let entries = state.ranker.snapshot(group_id).await?;
    Ok(Json(LeaderboardResponse { group_id, entries }))
}

/// POST /groups/:id/leaderboard/recompute
pub async fn recompute_leaderboard(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(group_id): Path<Uuid>,
) -> ApiResult<Json<LeaderboardResponse>> {
    Capabilities::evaluate(state.authorizer.as_ref(), &caller, group_id, None)
        .await?
        .require_review("recompute the leaderboard")?;

    let entries = state.ranker.recompute(group_id).await?;
    Ok(Json(LeaderboardResponse { group_id, entries }))
}

pub fn leaderboard_routes() -> Router<AppState> {
    Router::new()
        .route("/groups/:id/leaderboard", get(get_leaderboard))
        .route("/groups/:id/leaderboard/recompute", post(recompute_leaderboard))
}
