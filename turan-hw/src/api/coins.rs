//! Coin ledger endpoints

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use turan_common::db::TransactionKind;

use super::auth::AuthenticatedCaller;
use crate::error::{ApiResult, HomeworkError};
use crate::models::{CoinAccount, CoinTransaction, TransactionLinks};
use crate::services::{Caller, Reconciliation};
use crate::AppState;

/// POST /students/:id/coins/debit request
#[derive(Debug, Deserialize)]
pub struct DebitRequest {
    pub amount: u32,
    pub reason: String,
    /// `spent` (default) or `penalty`
    #[serde(default)]
    pub kind: Option<TransactionKind>,
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub student_id: Uuid,
    pub transactions: Vec<CoinTransaction>,
}

fn require_self_or_admin(caller: &Caller, student_id: Uuid) -> Result<(), HomeworkError> {
    if caller.is_admin() || caller.user_id == student_id {
        Ok(())
    } else {
        Err(HomeworkError::Forbidden(
            "Coin balances are visible to the student and admins only".to_string(),
        ))
    }
}

fn require_admin(caller: &Caller, what: &str) -> Result<(), HomeworkError> {
    if caller.is_admin() {
        Ok(())
    } else {
        Err(HomeworkError::Forbidden(format!("Only admins may {}", what)))
    }
}

/// GET /students/:id/coins
pub async fn get_account(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(student_id): Path<Uuid>,
) -> ApiResult<Json<CoinAccount>> {
    require_self_or_admin(&caller, student_id)?;
    Ok(Json(state.ledger.account(student_id).await?))
}

/// GET /students/:id/transactions (newest first)
pub async fn list_transactions(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(student_id): Path<Uuid>,
) -> ApiResult<Json<TransactionsResponse>> {
    require_self_or_admin(&caller, student_id)?;
    let transactions = state.ledger.transactions(student_id).await?;
    Ok(Json(TransactionsResponse {
        student_id,
        transactions,
    }))
}

/// POST /students/:id/coins/debit
pub async fn debit_coins(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(student_id): Path<Uuid>,
    Json(request): Json<DebitRequest>,
) -> ApiResult<Json<CoinTransaction>> {
    require_admin(&caller, "debit coins")?;

    let kind = match request.kind {
        None | Some(TransactionKind::Spent) => TransactionKind::Spent,
        Some(TransactionKind::Penalty) => TransactionKind::Penalty,
        Some(other) => {
            return Err(HomeworkError::Validation(format!("{:?} is not a debit", other)).into())
        }
    };

    let tx = state
        .ledger
        .post(student_id, kind, request.amount, &request.reason, TransactionLinks::default())
        .await?;
    Ok(Json(tx))
}

/// GET /students/:id/coins/reconcile
pub async fn reconcile_account(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(student_id): Path<Uuid>,
) -> ApiResult<Json<Reconciliation>> {
    require_admin(&caller, "reconcile accounts")?;
    Ok(Json(state.ledger.reconcile(student_id).await?))
}

pub fn coin_routes() -> Router<AppState> {
    Router::new()
        .route("/students/:id/coins", get(get_account))
        .route("/students/:id/transactions", get(list_transactions))
        .route("/students/:id/coins/debit", post(debit_coins))
        .route("/students/:id/coins/reconcile", get(reconcile_account))
}
