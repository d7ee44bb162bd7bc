//! Directory, audit and notification administration routes

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::admin;
use crate::state::AppState;

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/directory/users", get(admin::search_directory))
        .route("/api/admin/directory/import", post(admin::import_directory_users))
        .route(
            "/api/admin/directory/sync/:username",
            post(admin::sync_directory_user),
        )
        .route("/api/admin/audit", get(admin::recent_audit))
        .route("/api/admin/notifications", get(admin::notification_status))
        .route(
            "/api/admin/notifications/test",
            post(admin::send_test_notification),
        )
}
