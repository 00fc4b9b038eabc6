//! Settings endpoints
//!
//! GET /settings returns the active snapshot; POST /settings/reload re-reads
//! the settings table. Values are edited in the database by the admin panel.

use axum::{extract::State, routing::{get, post}, Json, Router};
use tracing::info;

use turan_common::events::TuranEvent;
use turan_common::time;

use super::auth::AuthenticatedCaller;
use crate::config::AssessmentSettings;
use crate::error::{ApiResult, HomeworkError};
use crate::AppState;

/// GET /settings
pub async fn get_settings(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> ApiResult<Json<AssessmentSettings>> {
    if !caller.is_admin() {
        return Err(HomeworkError::Forbidden("Only admins may view settings".to_string()).into());
    }
    Ok(Json(state.settings.current().as_ref().clone()))
}

/// POST /settings/reload
///
/// An invalid table is rejected with 422 and the previous values stay active.
pub async fn reload_settings(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> ApiResult<Json<AssessmentSettings>> {
    if !caller.is_admin() {
        return Err(HomeworkError::Forbidden("Only admins may reload settings".to_string()).into());
    }

    let fresh = state.settings.reload().await?;
    info!(admin = %caller.user_id, "Settings reloaded via API");
    state.event_bus.emit_lossy(TuranEvent::SettingsReloaded {
        timestamp: time::now(),
    });
    Ok(Json(fresh.as_ref().clone()))
}

pub fn settings_routes() -> Router<AppState> {
    Router::new()
        .route("/settings", get(get_settings))
        .route("/settings/reload", post(reload_settings))
}
