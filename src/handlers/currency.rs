//! Currency handlers

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Serialize;
use validator::Validate;

use super::{AdminUser, AuthenticatedUser};
use crate::error::ApiError;
use crate::models::{
    BulkGrantResult, CurrencyTransaction, GrantCurrencyRequest, PaginatedResponse,
    TransactionQuery,
};
use crate::services::ledger::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::state::AppState;

async fn page(
    state: &AppState,
    username: Option<&str>,
    query: &TransactionQuery,
) -> Result<PaginatedResponse<CurrencyTransaction>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);

    let data = state
        .ledger_service
        .list_transactions(username, Some(limit), Some(offset))
        .await?;
    let total = state.ledger_service.count_transactions(username).await?;

    Ok(PaginatedResponse {
        data,
        total,
        limit,
        offset,
    })
}

/// POST /api/currency/grant-all - same amount to every active account
pub async fn grant_all(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(req): Json<GrantCurrencyRequest>,
) -> Result<Json<BulkGrantResult>, ApiError> {
    req.validate()?;

    let result = state
        .ledger_service
        .grant_all(req.amount, req.note.as_deref(), &admin.username)
        .await?;

    Ok(Json(result))
}

/// GET /api/currency/transactions - the caller's own history
pub async fn my_transactions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<PaginatedResponse<CurrencyTransaction>>, ApiError> {
    Ok(Json(page(&state, Some(&user.username), &query).await?))
}

/// GET /api/admin/currency/transactions - optionally filtered by `username`
pub async fn all_transactions(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<PaginatedResponse<CurrencyTransaction>>, ApiError> {
    let username = query.username.clone();
    Ok(Json(page(&state, username.as_deref(), &query).await?))
}

#[derive(Debug, Serialize)]
pub struct ClearedResponse {
    pub deleted: u64,
}

/// DELETE /api/admin/currency/transactions
pub async fn clear_transactions(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> Result<Json<ClearedResponse>, ApiError> {
    let deleted = state
        .ledger_service
        .clear_transactions(&admin.username)
        .await?;

    Ok(Json(ClearedResponse { deleted }))
}
