//! Currency balances and the transaction log

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use crate::db;
use crate::error::{StoreError, StoreResult};
use crate::models::{BulkGrantResult, CurrencyTransaction, GrantResult, TransactionKind};
use crate::notify::{Notification, NotificationService};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 500;

/// Append a row to the currency log on an open connection or transaction
pub(crate) async fn log_transaction(
    conn: &mut SqliteConnection,
    username: &str,
    amount: i64,
    balance_after: i64,
    kind: TransactionKind,
    note: Option<&str>,
    added_by: &str,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO currency_transactions
            (username, amount, balance_after, transaction_type, note, added_by, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(username)
    .bind(amount)
    .bind(balance_after)
    .bind(kind)
    .bind(note)
    .bind(added_by)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

#[derive(Clone)]
pub struct LedgerService {
    db_pool: SqlitePool,
    notifications: NotificationService,
}

impl LedgerService {
    pub fn new(db_pool: SqlitePool, notifications: NotificationService) -> Self {
        Self {
            db_pool,
            notifications,
        }
    }

    /// Add (or with a negative amount, remove) currency for one user
    pub async fn grant(
        &self,
        username: &str,
        amount: i64,
        note: Option<&str>,
        added_by: &str,
        kind: TransactionKind,
    ) -> StoreResult<GrantResult> {
        if amount == 0 {
            return Err(StoreError::Invalid("Amount must not be zero".to_string()));
        }

        let mut tx = db::begin_write(&self.db_pool).await?;

        let (balance, email): (i64, Option<String>) =
            sqlx::query_as("SELECT balance, email FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("User '{}'", username)))?;

        let new_balance = balance
            .checked_add(amount)
            .ok_or_else(|| StoreError::Invalid("Balance overflow".to_string()))?;
        if new_balance < 0 {
            return Err(StoreError::InsufficientBalance {
                needed: amount.saturating_neg(),
                available: balance,
            });
        }

        sqlx::query("UPDATE users SET balance = ?, updated_at = ? WHERE username = ?")
            .bind(new_balance)
            .bind(Utc::now())
            .bind(username)
            .execute(&mut *tx)
            .await?;

        let transaction_id =
            log_transaction(&mut tx, username, amount, new_balance, kind, note, added_by).await?;

        tx.commit().await?;

        tracing::info!(
            username = %username,
            amount,
            new_balance,
            kind = kind.as_str(),
            added_by = %added_by,
            "Balance changed"
        );

        self.notify_balance_change(username, email.as_deref(), amount, new_balance, kind, note)
            .await;

        Ok(GrantResult {
            username: username.to_string(),
            new_balance,
            transaction_id: Some(transaction_id),
        })
    }

    /// Grant the same amount to every active user
    pub async fn grant_all(
        &self,
        amount: i64,
        note: Option<&str>,
        added_by: &str,
    ) -> StoreResult<BulkGrantResult> {
        if amount == 0 {
            return Err(StoreError::Invalid("Amount must not be zero".to_string()));
        }

        let mut tx = db::begin_write(&self.db_pool).await?;

        let accounts: Vec<(String, i64, Option<String>)> = sqlx::query_as(
            "SELECT username, balance, email FROM users WHERE is_active = 1 ORDER BY username",
        )
        .fetch_all(&mut *tx)
        .await?;

        let mut updates = Vec::with_capacity(accounts.len());
        for (username, balance, email) in accounts {
            let new_balance = balance.checked_add(amount).ok_or_else(|| {
                StoreError::Invalid(format!("Adding {} overflows the balance of '{}'", amount, username))
            })?;
            if new_balance < 0 {
                return Err(StoreError::Invalid(format!(
                    "Deducting {} would leave '{}' with a negative balance ({})",
                    amount.unsigned_abs(), username, balance
                )));
            }
            updates.push((username, email, new_balance));
        }

        let now = Utc::now();
        let mut transaction_ids = Vec::with_capacity(updates.len());

        for (username, _, new_balance) in &updates {
            sqlx::query("UPDATE users SET balance = ?, updated_at = ? WHERE username = ?")
                .bind(new_balance)
                .bind(now)
                .bind(username)
                .execute(&mut *tx)
                .await?;

            let id = log_transaction(
                &mut tx,
                username,
                amount,
                *new_balance,
                TransactionKind::BulkAdd,
                note,
                added_by,
            )
            .await?;
            transaction_ids.push(id);
        }

        tx.commit().await?;

        let updated = updates.len() as u64;
        tracing::info!(amount, users = updated, added_by = %added_by, "Bulk balance change");

        // Delivery is best effort and may be slow, so it runs after the response
        let ledger = self.clone();
        let note = note.map(str::to_string);
        tokio::spawn(async move {
            for (username, email, new_balance) in updates {
                ledger
                    .notify_balance_change(
                        &username,
                        email.as_deref(),
                        amount,
                        new_balance,
                        TransactionKind::BulkAdd,
                        note.as_deref(),
                    )
                    .await;
            }
        });

        Ok(BulkGrantResult {
            updated,
            transaction_ids,
        })
    }

    /// Set an absolute balance; the difference is logged as an admin update
    pub async fn set_balance(
        &self,
        username: &str,
        new_balance: i64,
        note: Option<&str>,
        added_by: &str,
    ) -> StoreResult<GrantResult> {
        if new_balance < 0 {
            return Err(StoreError::Invalid("Balance cannot be negative".to_string()));
        }

        let mut tx = db::begin_write(&self.db_pool).await?;

        let (balance, email): (i64, Option<String>) =
            sqlx::query_as("SELECT balance, email FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("User '{}'", username)))?;

        let delta = new_balance - balance;
        if delta == 0 {
            return Ok(GrantResult {
                username: username.to_string(),
                new_balance,
                transaction_id: None,
            });
        }

        sqlx::query("UPDATE users SET balance = ?, updated_at = ? WHERE username = ?")
            .bind(new_balance)
            .bind(Utc::now())
            .bind(username)
            .execute(&mut *tx)
            .await?;

        let transaction_id = log_transaction(
            &mut tx,
            username,
            delta,
            new_balance,
            TransactionKind::AdminUpdate,
            note,
            added_by,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(username = %username, delta, new_balance, added_by = %added_by, "Balance set");

        self.notify_balance_change(
            username,
            email.as_deref(),
            delta,
            new_balance,
            TransactionKind::AdminUpdate,
            note,
        )
        .await;

        Ok(GrantResult {
            username: username.to_string(),
            new_balance,
            transaction_id: Some(transaction_id),
        })
    }

    /// Newest first, optionally for a single user
    pub async fn list_transactions(
        &self,
        username: Option<&str>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> StoreResult<Vec<CurrencyTransaction>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = offset.unwrap_or(0).max(0);

        let mut query_builder = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            "SELECT id, username, amount, balance_after, transaction_type, note, added_by, created_at \
             FROM currency_transactions WHERE 1=1",
        );

        if let Some(username) = username {
            query_builder.push(" AND username = ");
            query_builder.push_bind(username);
        }

        query_builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        query_builder.push_bind(limit);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(offset);

        let rows = query_builder
            .build_query_as::<CurrencyTransaction>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(rows)
    }

    pub async fn count_transactions(&self, username: Option<&str>) -> StoreResult<i64> {
        let mut count_builder = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            "SELECT COUNT(*) FROM currency_transactions WHERE 1=1",
        );
        if let Some(username) = username {
            count_builder.push(" AND username = ");
            count_builder.push_bind(username);
        }

        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.db_pool)
            .await?;

        Ok(total)
    }

    /// Wipe the whole log. Balances are not touched.
    pub async fn clear_transactions(&self, cleared_by: &str) -> StoreResult<u64> {
        let deleted = sqlx::query("DELETE FROM currency_transactions")
            .execute(&self.db_pool)
            .await?
            .rows_affected();

        tracing::warn!(deleted, cleared_by = %cleared_by, "Currency transaction log cleared");
        Ok(deleted)
    }

    pub(crate) async fn notify_balance_change(
        &self,
        username: &str,
        email: Option<&str>,
        amount: i64,
        new_balance: i64,
        kind: TransactionKind,
        note: Option<&str>,
    ) {
        let notification = Notification::BalanceChanged {
            username: username.to_string(),
            amount,
            new_balance,
            kind,
            note: note.map(str::to_string),
            at: Utc::now(),
        };

        if let Err(e) = self
            .notifications
            .send_to_user(username, email, &notification)
            .await
        {
            tracing::debug!(username = %username, error = %e, "Balance notification not sent");
        }
    }
}
