//! Homework endpoints
//!
//! POST /lessons/:id/homework, GET /homeworks/:id, POST /homeworks/:id/submit,
//! POST /homeworks/:id/review, POST /homeworks/:id/second-chance

use axum::{
    body::{self, Body},
    extract::{DefaultBodyLimit, Path, State},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        HeaderMap, StatusCode,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::AuthenticatedCaller;
use crate::error::{ApiError, ApiResult, HomeworkError};
use crate::models::{HomeworkSubmission, ReviewDecision};
use crate::AppState;

/// POST /lessons/:id/homework response
#[derive(Debug, Serialize)]
pub struct AssignResponse {
    pub lesson_id: Uuid,
    pub created: Vec<HomeworkSubmission>,
}

/// POST /homeworks/:id/review request
#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub status: ReviewDecision,
    #[serde(default)]
    pub feedback: String,
}

/// POST /lessons/:id/homework
pub async fn assign_homework(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(lesson_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<AssignResponse>)> {
    let created = state.assigner.assign_as(&caller, lesson_id).await?;
    Ok((StatusCode::CREATED, Json(AssignResponse { lesson_id, created })))
}

/// GET /homeworks/:id
pub async fn get_homework(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(homework_id): Path<Uuid>,
) -> ApiResult<Json<HomeworkSubmission>> {
    Ok(Json(state.review.view(&caller, homework_id).await?))
}

/// POST /homeworks/:id/submit
///
/// The body is the raw audio; its format comes from `Content-Type`.
/// Scoring happens asynchronously, so the response is 202 with the record
/// in `submitted`. The body is read up to the audio limit in force for this
/// request, so a reloaded limit applies without rebuilding the router.
pub async fn submit_homework(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(homework_id): Path<Uuid>,
    headers: HeaderMap,
    payload: Body,
) -> ApiResult<(StatusCode, Json<HomeworkSubmission>)> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Content-Type header is required".to_string()))?;

    let settings = state.settings.current();
    let limit = settings.max_audio_bytes();
    let too_large = || {
        HomeworkError::Validation(format!(
            "Audio exceeds the {} MB limit",
            settings.max_audio_file_size_mb
        ))
    };

    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(too_large().into());
    }

    let audio = body::to_bytes(payload, usize::try_from(limit).unwrap_or(usize::MAX))
        .await
        .map_err(|_| too_large())?;

    let hw = state
        .intake
        .submit(&caller, homework_id, content_type, &audio)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(hw)))
}

/// POST /homeworks/:id/review
pub async fn review_homework(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(homework_id): Path<Uuid>,
    Json(request): Json<ReviewRequest>,
) -> ApiResult<Json<HomeworkSubmission>> {
    let hw = state
        .review
        .review(&caller, homework_id, request.status, &request.feedback)
        .await?;
    Ok(Json(hw))
}

/// POST /homeworks/:id/second-chance
pub async fn grant_second_chance(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(homework_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<HomeworkSubmission>)> {
    let hw = state.review.grant_second_chance(&caller, homework_id).await?;
    Ok((StatusCode::CREATED, Json(hw)))
}

/// Build homework routes
pub fn homework_routes() -> Router<AppState> {
    Router::new()
        .route("/lessons/:id/homework", post(assign_homework))
        .route("/homeworks/:id", get(get_homework))
        .route(
            "/homeworks/:id/submit",
            post(submit_homework).layer(DefaultBodyLimit::disable()),
        )
        .route("/homeworks/:id/review", post(review_homework))
        .route("/homeworks/:id/second-chance", post(grant_second_chance))
}
