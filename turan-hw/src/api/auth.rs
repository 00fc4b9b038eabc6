//! Caller identity extraction
//!
//! Session handling lives in front of this service; requests arrive with the
//! authenticated user id in `X-User-Id`.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::{ApiError, HomeworkError};
use crate::services::Caller;
use crate::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Caller resolved from the request headers
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedCaller(pub Caller);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedCaller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {} header", USER_ID_HEADER)))?;

        let user_id = raw
            .to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .ok_or_else(|| ApiError::Unauthorized(format!("Malformed {} header", USER_ID_HEADER)))?;

        match Caller::resolve(state.authorizer.as_ref(), user_id).await {
            Ok(caller) => Ok(AuthenticatedCaller(caller)),
            Err(HomeworkError::Forbidden(msg)) => Err(ApiError::Unauthorized(msg)),
            Err(e) => Err(e.into()),
        }
    }
}
