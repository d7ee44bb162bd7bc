//! Order routes

use axum::{routing::get, Router};

use crate::handlers::orders;
use crate::state::AppState;

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/orders",
            get(orders::list_my_orders).post(orders::place_order),
        )
        .route("/api/orders/:order_id", get(orders::get_order))
        .route("/api/admin/orders", get(orders::list_all_orders))
}
