//! Currency log and directory audit models

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use validator::Validate;

/// Kinds of balance change recorded in the currency log
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    AdminAdd,
    BulkAdd,
    AdminUpdate,
    Purchase,
    Refund,
    InitialBalance,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::AdminAdd => "admin_add",
            TransactionKind::BulkAdd => "bulk_add",
            TransactionKind::AdminUpdate => "admin_update",
            TransactionKind::Purchase => "purchase",
            TransactionKind::Refund => "refund",
            TransactionKind::InitialBalance => "initial_balance",
        }
    }
}

/// Currency log row
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct CurrencyTransaction {
    pub id: i64,
    pub username: String,
    pub amount: i64,
    pub balance_after: i64,
    pub transaction_type: TransactionKind,
    pub note: Option<String>,
    pub added_by: String,
    pub created_at: DateTime<Utc>,
}

/// Directory audit log row
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct AuditEntry {
    pub id: i64,
    pub username: String,
    pub action: String,
    pub details: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct GrantCurrencyRequest {
    pub amount: i64,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetBalanceRequest {
    #[validate(range(min = 0))]
    pub balance: i64,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GrantResult {
    pub username: String,
    pub new_balance: i64,
    pub transaction_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BulkGrantResult {
    pub updated: u64,
    pub transaction_ids: Vec<i64>,
}

/// Pagination parameters for the currency log
#[derive(Debug, Deserialize, Default)]
pub struct TransactionQuery {
    pub username: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Paginated response
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Deserialize, Default)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}
