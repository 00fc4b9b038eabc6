//! Error types for turan-hw
//!
//! `HomeworkError` is the domain taxonomy returned by services;
//! `ApiError` maps it onto HTTP status codes at the boundary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Domain error returned by every service operation
#[derive(Debug, Error)]
pub enum HomeworkError {
    /// Referenced record does not exist (or is not visible to the caller)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation is not legal from the record's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Input failed validation (format, size, bounds)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Caller lacks the capability for this operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Debit larger than the current balance
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: u32, available: u32 },

    /// Collaborator (transcription, authorization) failed or timed out
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Stored balance disagrees with the transaction log
    #[error("Ledger invariant violated: {0}")]
    LedgerInvariant(String),

    /// Invalid settings value
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Common error: {0}")]
    Common(#[from] turan_common::Error),
}

/// Result type for service operations
pub type HwResult<T> = Result<T, HomeworkError>;

impl HomeworkError {
    /// True for SQLite lock contention, which is worth retrying
    pub fn is_database_locked(&self) -> bool {
        match self {
            HomeworkError::Database(e) => e.to_string().contains("database is locked"),
            HomeworkError::Common(e) => e.is_database_locked(),
            _ => false,
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing or unknown caller identity (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Domain error, mapped per variant
    #[error(transparent)]
    Homework(#[from] HomeworkError),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<turan_common::Error> for ApiError {
    fn from(err: turan_common::Error) -> Self {
        ApiError::Homework(HomeworkError::Common(err))
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Homework(HomeworkError::Database(err))
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Homework(err) => match err {
                HomeworkError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                HomeworkError::InvalidState(_) => (StatusCode::CONFLICT, "INVALID_STATE"),
                HomeworkError::Validation(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR")
                }
                HomeworkError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                HomeworkError::InsufficientFunds { .. } => {
                    (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_FUNDS")
                }
                HomeworkError::ExternalService(_) => {
                    (StatusCode::BAD_GATEWAY, "EXTERNAL_SERVICE_ERROR")
                }
                HomeworkError::LedgerInvariant(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "LEDGER_INVARIANT")
                }
                HomeworkError::Config(_) => (StatusCode::UNPROCESSABLE_ENTITY, "CONFIG_ERROR"),
                HomeworkError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
                HomeworkError::Database(_) | HomeworkError::Common(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            },
        }
    }

    /// HTTP status this error maps to
    pub fn status(&self) -> StatusCode {
        self.parts().0
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.parts();
        let message = match &self {
            ApiError::Homework(err) => err.to_string(),
            other => other.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, "{}", message);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
