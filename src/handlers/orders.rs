//! Order handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use super::{AdminUser, AuthenticatedUser};
use crate::error::ApiError;
use crate::models::{OrderDetail, OrderReceipt, PlaceOrderRequest};
use crate::state::AppState;

/// POST /api/orders - Buy items with the caller's balance
pub async fn place_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderReceipt>), ApiError> {
    req.validate()?;

    let receipt = state
        .order_service
        .place_order(&user.username, &req.items)
        .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

/// GET /api/orders - The caller's orders, newest first
pub async fn list_my_orders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<OrderDetail>>, ApiError> {
    let orders = state.order_service.list_orders_for(&user.username).await?;
    Ok(Json(orders))
}

/// GET /api/orders/:order_id
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<String>,
) -> Result<Json<OrderDetail>, ApiError> {
    let order = state
        .order_service
        .get_order(&order_id, &user.username, user.is_admin)
        .await?;

    Ok(Json(order))
}

/// GET /api/admin/orders
pub async fn list_all_orders(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<Vec<OrderDetail>>, ApiError> {
    let orders = state.order_service.list_all_orders().await?;
    Ok(Json(orders))
}
