//! Catalog and review routes

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::handlers::items;
use crate::state::AppState;

/// Multipart framing on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn item_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/api/items", get(items::list_items).post(items::create_item))
        .route("/api/items/availability", post(items::check_availability))
        .route(
            "/api/items/:name",
            get(items::get_item)
                .put(items::update_item)
                .delete(items::delete_item),
        )
        .route(
            "/api/items/:name/image",
            post(items::upload_image)
                .layer(DefaultBodyLimit::max(max_upload_bytes + MULTIPART_OVERHEAD)),
        )
        .route(
            "/api/items/:name/reviews",
            get(items::list_reviews).post(items::add_review),
        )
        .route("/api/items/:name/reviews/:id", delete(items::delete_review))
}
