//! User administration handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use validator::Validate;

use super::{AdminUser, AuthenticatedUser};
use crate::error::ApiError;
use crate::models::{
    CreateUserRequest, GrantCurrencyRequest, GrantResult, Removal, SetBalanceRequest,
    TransactionKind, UpdateUserRequest, UserListQuery, UserResponse,
};
use crate::state::AppState;

/// GET /api/users
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = state.user_service.list(query.kind).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// POST /api/users
pub async fn create_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    req.validate()?;

    let user = state
        .user_service
        .create_local(
            &req.username,
            &req.password,
            req.balance,
            req.is_admin,
            &admin.username,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

/// GET /api/users/:username
pub async fn get_user(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(username): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.user_service.get(&username).await?;
    Ok(Json(user.into()))
}

/// PUT /api/users/:username
pub async fn update_user(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(username): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    req.validate()?;
    let user = state.user_service.update(&username, req).await?;
    Ok(Json(user.into()))
}

#[derive(Debug, Serialize)]
pub struct RemovalResponse {
    pub username: String,
    pub result: Removal,
}

/// DELETE /api/users/:username - directory accounts are deactivated, local ones deleted
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(username): Path<String>,
) -> Result<Json<RemovalResponse>, ApiError> {
    if username == admin.username {
        return Err(ApiError::BadRequest(
            "You cannot remove your own account".to_string(),
        ));
    }

    let result = state.user_service.delete(&username).await?;
    tracing::info!(username = %username, result = ?result, admin = %admin.username, "User removed");

    Ok(Json(RemovalResponse { username, result }))
}

/// POST /api/users/:username/reactivate
pub async fn reactivate_user(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(username): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.user_service.reactivate(&username).await?;
    Ok(Json(user.into()))
}

/// PUT /api/users/:username/balance - set an absolute balance
pub async fn set_balance(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(username): Path<String>,
    Json(req): Json<SetBalanceRequest>,
) -> Result<Json<GrantResult>, ApiError> {
    req.validate()?;

    let result = state
        .ledger_service
        .set_balance(&username, req.balance, req.note.as_deref(), &admin.username)
        .await?;

    Ok(Json(result))
}

/// POST /api/users/:username/currency - add (or remove) currency
pub async fn grant_currency(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(username): Path<String>,
    Json(req): Json<GrantCurrencyRequest>,
) -> Result<Json<GrantResult>, ApiError> {
    req.validate()?;

    let result = state
        .ledger_service
        .grant(
            &username,
            req.amount,
            req.note.as_deref(),
            &admin.username,
            TransactionKind::AdminAdd,
        )
        .await?;

    Ok(Json(result))
}

#[derive(Debug, Serialize)]
pub struct AdminCheckResponse {
    pub username: String,
    pub is_admin: bool,
}

/// GET /api/auth/is-admin - admin flag of the caller, read from the database
pub async fn check_admin(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<AdminCheckResponse>, ApiError> {
    let is_admin = state.user_service.is_admin(&user.username).await?;
    Ok(Json(AdminCheckResponse {
        username: user.username,
        is_admin,
    }))
}
