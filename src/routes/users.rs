//! User administration routes

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers::users;
use crate::state::AppState;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(users::list_users).post(users::create_user))
        .route(
            "/api/users/:username",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/api/users/:username/reactivate", post(users::reactivate_user))
        .route("/api/users/:username/balance", put(users::set_balance))
        .route("/api/users/:username/currency", post(users::grant_currency))
}
