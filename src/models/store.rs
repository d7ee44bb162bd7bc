//! Catalog, review and order models

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use validator::Validate;

/// Catalog item
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Item {
    pub name: String,
    pub description: String,
    pub price: i64,
    pub image: Option<String>,
    pub sold_out: bool,
    pub unlisted: bool,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const ITEM_COLUMNS: &str =
    "name, description, price, image, sold_out, unlisted, quantity, created_at, updated_at";

/// Product review
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Review {
    pub id: i64,
    pub item: String,
    pub username: Option<String>,
    pub rating: i64,
    pub review_text: String,
    pub created_at: DateTime<Utc>,
}

/// Order header
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Order {
    pub order_id: String,
    pub username: String,
    pub user_email: Option<String>,
    pub total_amount: i64,
    pub balance_after: i64,
    pub status: String,
    pub notified: bool,
    pub created_at: DateTime<Utc>,
}

/// One priced line of an order
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct OrderItem {
    pub item_name: String,
    pub item_price: i64,
    pub quantity: i64,
}

impl OrderItem {
    pub fn line_total(&self) -> i64 {
        self.item_price * self.quantity
    }
}

/// Order with its lines
#[derive(Debug, Serialize, Clone)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateItemRequest {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 4000))]
    pub description: String,
    #[validate(range(min = 0))]
    pub price: i64,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub quantity: i64,
    #[serde(default)]
    pub sold_out: bool,
    #[serde(default)]
    pub unlisted: bool,
}

#[derive(Debug, Deserialize, Validate, Default)]
pub struct UpdateItemRequest {
    #[validate(length(max = 4000))]
    pub description: Option<String>,
    #[validate(range(min = 0))]
    pub price: Option<i64>,
    #[validate(range(min = 0))]
    pub quantity: Option<i64>,
    pub sold_out: Option<bool>,
    pub unlisted: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ItemListQuery {
    #[serde(default)]
    pub include_unlisted: bool,
}

/// Requested item and quantity, used by orders and availability checks
#[derive(Debug, Deserialize, Serialize, Validate, Clone)]
pub struct OrderLineRequest {
    #[validate(length(min = 1))]
    pub item: String,
    #[validate(range(min = 1))]
    pub quantity: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AvailabilityRequest {
    #[validate(length(min = 1))]
    pub items: Vec<OrderLineRequest>,
}

/// Why a line cannot be fulfilled
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Shortfall {
    pub item: String,
    pub requested: i64,
    pub available: i64,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub available: bool,
    pub message: String,
    pub insufficient: Vec<Shortfall>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewRequest {
    #[validate(range(min = 1, max = 5))]
    pub rating: i64,
    #[validate(length(min = 1, max = 2000))]
    pub review_text: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PlaceOrderRequest {
    #[validate(length(min = 1))]
    pub items: Vec<OrderLineRequest>,
}

/// Outcome of the post-commit notifications
#[derive(Debug, Serialize, Clone, Default)]
pub struct NotificationOutcome {
    pub confirmation_sent: bool,
    pub fulfillment_sent: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderReceipt {
    #[serde(flatten)]
    pub order: OrderDetail,
    pub notifications: NotificationOutcome,
}
