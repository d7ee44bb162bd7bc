//! Directory, audit and notification administration

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Serialize;
use validator::Validate;

use super::AdminUser;
use crate::error::ApiError;
use crate::models::{
    AuditEntry, DirectorySearchQuery, DirectoryUserView, ImportResult, ImportUsersRequest,
    LimitQuery, TestNotificationRequest, UserResponse,
};
use crate::notify::{NotificationStatus, NotifyError};
use crate::state::AppState;

/// GET /api/admin/directory/users?q=
pub async fn search_directory(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<DirectorySearchQuery>,
) -> Result<Json<Vec<DirectoryUserView>>, ApiError> {
    let users = state
        .directory_admin
        .search(&query.q, query.limit)
        .await?;

    Ok(Json(users))
}

/// POST /api/admin/directory/import
pub async fn import_directory_users(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(req): Json<ImportUsersRequest>,
) -> Result<Json<ImportResult>, ApiError> {
    req.validate()?;

    let result = state
        .directory_admin
        .import(&req.usernames, &admin.username)
        .await?;

    Ok(Json(result))
}

/// POST /api/admin/directory/sync/:username
pub async fn sync_directory_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(username): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .directory_admin
        .sync(&username, &admin.username)
        .await?;

    Ok(Json(user.into()))
}

/// GET /api/admin/audit?limit=
pub async fn recent_audit(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    let entries = state.audit.recent(query.limit.unwrap_or(100)).await?;
    Ok(Json(entries))
}

/// GET /api/admin/notifications
pub async fn notification_status(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Json<NotificationStatus> {
    Json(state.notifications.status())
}

#[derive(Debug, Serialize)]
pub struct TestNotificationResponse {
    pub sent: bool,
    pub to: String,
}

/// POST /api/admin/notifications/test
pub async fn send_test_notification(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(req): Json<TestNotificationRequest>,
) -> Result<Json<TestNotificationResponse>, ApiError> {
    req.validate()?;

    match state.notifications.send_test(&req.to).await {
        Ok(()) => {
            tracing::info!(to = %req.to, admin = %admin.username, "Test notification sent");
            Ok(Json(TestNotificationResponse {
                sent: true,
                to: req.to,
            }))
        }
        Err(e @ NotifyError::Disabled) | Err(e @ NotifyError::NoRecipient(_)) => {
            Err(ApiError::BadRequest(e.to_string()))
        }
        Err(e @ NotifyError::DeliveryFailed(_)) => Err(ApiError::ExternalServiceError(e.to_string())),
    }
}
