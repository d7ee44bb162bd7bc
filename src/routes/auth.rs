//! Authentication routes

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{auth, users};
use crate::state::AppState;

/// Create authentication routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/refresh", post(auth::refresh_token))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/logout-all", post(auth::logout_all))
        .route("/api/auth/me", get(auth::get_current_user))
        .route("/api/auth/is-admin", get(users::check_admin))
        .route("/api/auth/directory", get(auth::directory_status))
}
