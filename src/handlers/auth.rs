//! Authentication HTTP handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use validator::Validate;

use super::{AuthenticatedUser, ClientInfo};
use crate::error::ApiError;
use crate::models::{
    AuthTokensResponse, DirectoryStatusResponse, LoginOutcome, LoginRequest, RefreshTokenRequest,
    RegisterRequest, UserResponse,
};
use crate::state::AppState;

/// POST /api/auth/register - Create a local account
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    req.validate()?;

    let user = state
        .auth_service
        .register(&req.username, &req.password)
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /api/auth/login - Local or directory login
pub async fn login(
    State(state): State<AppState>,
    ClientInfo(ctx): ClientInfo,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginOutcome>, ApiError> {
    let outcome = state
        .auth_service
        .login(&req.username, &req.password, &ctx)
        .await?;

    Ok(Json(outcome))
}

/// POST /api/auth/refresh - Rotate tokens with a refresh token
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<Json<AuthTokensResponse>, ApiError> {
    let tokens = state.auth_service.refresh_tokens(&req.refresh_token).await?;
    Ok(Json(tokens))
}

/// POST /api/auth/logout - Revoke current session
pub async fn logout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<StatusCode, ApiError> {
    state.auth_service.revoke_session(&user.jti).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct LogoutAllResponse {
    pub revoked_sessions: u64,
}

/// POST /api/auth/logout-all - Revoke all sessions for current user
pub async fn logout_all(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<LogoutAllResponse>, ApiError> {
    let revoked_sessions = state
        .auth_service
        .revoke_all_sessions(&user.username)
        .await?;

    Ok(Json(LogoutAllResponse { revoked_sessions }))
}

/// GET /api/auth/me - Current account, including balance
pub async fn get_current_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.user_service.get(&user.username).await?;
    Ok(Json(user.into()))
}

/// GET /api/auth/directory - Whether directory login is available
pub async fn directory_status(State(state): State<AppState>) -> Json<DirectoryStatusResponse> {
    Json(state.auth_service.directory_status())
}
