//! HTTP API handlers
//!
//! REST endpoints for assignment, submission, review, coins and
//! leaderboards, plus an SSE stream of domain events.

pub mod auth;
pub mod coins;
pub mod health;
pub mod homework;
pub mod leaderboard;
pub mod settings;
pub mod sse;

pub use auth::{AuthenticatedCaller, USER_ID_HEADER};
pub use coins::coin_routes;
pub use health::health_routes;
pub use homework::homework_routes;
pub use leaderboard::leaderboard_routes;
pub use settings::settings_routes;
pub use sse::event_stream;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::AppState;

/// Remember the most recent server error for `/health`
pub async fn track_server_errors(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let route = format!("{} {}", request.method(), request.uri().path());
    let response = next.run(request).await;

    if response.status().is_server_error() {
        let mut last = state.last_error.write().await;
        *last = Some(format!("{} returned {}", route, response.status()));
    }
    response
}
