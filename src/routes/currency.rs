//! Currency routes

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::currency;
use crate::state::AppState;

pub fn currency_routes() -> Router<AppState> {
    Router::new()
        .route("/api/currency/grant-all", post(currency::grant_all))
        .route("/api/currency/transactions", get(currency::my_transactions))
        .route(
            "/api/admin/currency/transactions",
            get(currency::all_transactions).delete(currency::clear_transactions),
        )
}
