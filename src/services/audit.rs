//! Directory audit trail

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::StoreError;
use crate::models::AuditEntry;

/// Where a request came from
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Writes to `directory_audit_log`. Failures to record are logged, never raised.
#[derive(Clone)]
pub struct AuditLog {
    db_pool: Option<SqlitePool>,
}

impl AuditLog {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self {
            db_pool: Some(db_pool),
        }
    }

    /// An audit log that records nothing
    pub fn disabled() -> Self {
        Self { db_pool: None }
    }

    pub async fn record(
        &self,
        username: &str,
        action: &str,
        details: Option<&str>,
        ctx: &ClientContext,
        success: bool,
        error_message: Option<&str>,
    ) {
        let Some(pool) = &self.db_pool else {
            return;
        };

        let result = sqlx::query(
            r#"
            INSERT INTO directory_audit_log
                (username, action, details, ip_address, user_agent, success, error_message, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(username)
        .bind(action)
        .bind(details)
        .bind(&ctx.ip_address)
        .bind(&ctx.user_agent)
        .bind(success)
        .bind(error_message)
        .bind(Utc::now())
        .execute(pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(username = %username, action = %action, error = %e, "Failed to write audit record");
        }
    }

    /// Most recent entries first
    pub async fn recent(&self, limit: i64) -> Result<Vec<AuditEntry>, StoreError> {
        let Some(pool) = &self.db_pool else {
            return Ok(Vec::new());
        };

        let entries = sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT id, username, action, details, ip_address, user_agent, success, error_message, created_at
            FROM directory_audit_log
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit.clamp(1, 1000))
        .fetch_all(pool)
        .await?;

        Ok(entries)
    }
}
