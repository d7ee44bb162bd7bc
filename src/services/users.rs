//! User administration

use chrono::Utc;
use sqlx::SqlitePool;

use crate::auth::{hash_password_with_cost, normalize_username, DirectoryEntry};
use crate::db;
use crate::error::{StoreError, StoreResult};
use crate::models::{Removal, TransactionKind, UpdateUserRequest, User, UserKind, USER_COLUMNS};
use crate::services::ledger::log_transaction;

#[derive(Clone)]
pub struct UserService {
    db_pool: SqlitePool,
    password_hash_cost: u32,
    fallback_admin: String,
}

impl UserService {
    pub fn new(db_pool: SqlitePool, password_hash_cost: u32, fallback_admin: String) -> Self {
        Self {
            db_pool,
            password_hash_cost,
            fallback_admin,
        }
    }

    pub fn fallback_admin(&self) -> &str {
        &self.fallback_admin
    }

    pub fn is_fallback_admin(&self, username: &str) -> bool {
        username.eq_ignore_ascii_case(&self.fallback_admin)
    }

    pub fn hash(&self, password: &str) -> StoreResult<String> {
        hash_password_with_cost(password, self.password_hash_cost)
    }

    pub async fn find(&self, username: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE username = ?",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(user)
    }

    /// Look up by the name as given, then by its normalized form
    pub async fn find_any(&self, raw: &str, normalized: &str) -> StoreResult<Option<User>> {
        if let Some(user) = self.find(raw).await? {
            return Ok(Some(user));
        }
        if raw != normalized {
            return self.find(normalized).await;
        }
        Ok(None)
    }

    pub async fn get(&self, username: &str) -> StoreResult<User> {
        self.find(username)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("User '{}'", username)))
    }

    pub async fn list(&self, kind: Option<UserKind>) -> StoreResult<Vec<User>> {
        let mut query_builder = sqlx::QueryBuilder::<sqlx::Sqlite>::new(format!(
            "SELECT {} FROM users WHERE 1=1",
            USER_COLUMNS
        ));

        if let Some(kind) = kind {
            query_builder.push(" AND kind = ");
            query_builder.push_bind(kind);
        }
        query_builder.push(" ORDER BY username");

        let users = query_builder
            .build_query_as::<User>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(users)
    }

    pub async fn is_admin(&self, username: &str) -> StoreResult<bool> {
        let flag: Option<bool> =
            sqlx::query_scalar("SELECT is_admin FROM users WHERE username = ? AND is_active = 1")
                .bind(username)
                .fetch_optional(&self.db_pool)
                .await?;

        Ok(flag.unwrap_or(false))
    }

    /// Create a local account. A starting balance is written to the currency log.
    pub async fn create_local(
        &self,
        username: &str,
        password: &str,
        balance: i64,
        is_admin: bool,
        created_by: &str,
    ) -> StoreResult<User> {
        let raw = username.trim();
        let username = normalize_username(raw);
        if username.is_empty() {
            return Err(StoreError::Invalid("Username is required".to_string()));
        }
        if balance < 0 {
            return Err(StoreError::Invalid("Balance cannot be negative".to_string()));
        }

        let taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username IN (?, ?)")
            .bind(raw)
            .bind(&username)
            .fetch_one(&self.db_pool)
            .await?;
        if taken > 0 {
            return Err(StoreError::Conflict(format!(
                "Username '{}' is already taken",
                username
            )));
        }

        let password_hash = self.hash(password)?;
        let now = Utc::now();

        let mut tx = db::begin_write(&self.db_pool).await?;

        sqlx::query(
            r#"
            INSERT INTO users (username, password_hash, balance, is_admin, kind, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&username)
        .bind(&password_hash)
        .bind(balance)
        .bind(is_admin)
        .bind(UserKind::Local)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if balance > 0 {
            log_transaction(
                &mut tx,
                &username,
                balance,
                balance,
                TransactionKind::InitialBalance,
                Some("Initial balance"),
                created_by,
            )
            .await?;
        }

        tx.commit().await?;

        tracing::info!(username = %username, is_admin, balance, "Created local user");
        self.get(&username).await
    }

    pub async fn update(&self, username: &str, request: UpdateUserRequest) -> StoreResult<User> {
        let user = self.get(username).await?;

        if request.is_admin == Some(false) && self.is_fallback_admin(&user.username) {
            return Err(StoreError::Forbidden(
                "The fallback admin cannot lose admin rights".to_string(),
            ));
        }

        let password_hash = match request.password.as_deref() {
            Some(password) => Some(self.hash(password)?),
            None => None,
        };

        sqlx::query(
            r#"
            UPDATE users SET
                password_hash = COALESCE(?, password_hash),
                is_admin = COALESCE(?, is_admin),
                display_name = COALESCE(?, display_name),
                updated_at = ?
            WHERE username = ?
            "#,
        )
        .bind(password_hash)
        .bind(request.is_admin)
        .bind(request.display_name)
        .bind(Utc::now())
        .bind(&user.username)
        .execute(&self.db_pool)
        .await?;

        tracing::info!(username = %user.username, "Updated user");
        self.get(&user.username).await
    }

    /// Directory accounts are deactivated; local accounts are removed with their sessions.
    pub async fn delete(&self, username: &str) -> StoreResult<Removal> {
        let user = self.get(username).await?;

        if self.is_fallback_admin(&user.username) {
            return Err(StoreError::Forbidden(
                "The fallback admin cannot be deleted".to_string(),
            ));
        }

        match user.kind {
            UserKind::Directory => {
                let now = Utc::now();
                let mut tx = db::begin_write(&self.db_pool).await?;
                sqlx::query("UPDATE users SET is_active = 0, updated_at = ? WHERE username = ?")
                    .bind(now)
                    .bind(&user.username)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query(
                    "UPDATE sessions SET revoked = 1, revoked_at = ?, updated_at = ? WHERE username = ? AND revoked = 0",
                )
                .bind(now)
                .bind(now)
                .bind(&user.username)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;

                tracing::info!(username = %user.username, "Deactivated directory user");
                Ok(Removal::Deactivated)
            }
            UserKind::Local => {
                sqlx::query("DELETE FROM users WHERE username = ?")
                    .bind(&user.username)
                    .execute(&self.db_pool)
                    .await?;

                tracing::info!(username = %user.username, "Deleted local user");
                Ok(Removal::Deleted)
            }
        }
    }

    pub async fn reactivate(&self, username: &str) -> StoreResult<User> {
        let user = self.get(username).await?;

        sqlx::query("UPDATE users SET is_active = 1, updated_at = ? WHERE username = ?")
            .bind(Utc::now())
            .bind(&user.username)
            .execute(&self.db_pool)
            .await?;

        tracing::info!(username = %user.username, "Reactivated user");
        self.get(&user.username).await
    }

    /// Create the bootstrap admin if it does not exist yet
    pub async fn ensure_fallback_admin(&self, password: &str) -> StoreResult<bool> {
        if self.find(&self.fallback_admin).await?.is_some() {
            return Ok(false);
        }

        let password_hash = self.hash(password)?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO users (username, password_hash, balance, is_admin, kind, is_active, created_at, updated_at)
            VALUES (?, ?, 0, 1, ?, 1, ?, ?)
            ON CONFLICT(username) DO NOTHING
            "#,
        )
        .bind(&self.fallback_admin)
        .bind(password_hash)
        .bind(UserKind::Local)
        .bind(now)
        .bind(now)
        .execute(&self.db_pool)
        .await?;

        tracing::info!(username = %self.fallback_admin, "Created fallback admin account");
        Ok(true)
    }

    /// Insert a directory account, or refresh the attributes of an existing one.
    /// Local accounts with the same name are left untouched.
    pub async fn upsert_directory_user(&self, entry: &DirectoryEntry) -> StoreResult<User> {
        let username = normalize_username(&entry.account_name);
        if username.is_empty() {
            return Err(StoreError::Invalid(
                "Directory entry has no account name".to_string(),
            ));
        }
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO users (
                username, password_hash, balance, is_admin, kind, directory_account,
                directory_domain, display_name, email, last_directory_sync, is_active,
                created_at, updated_at
            )
            VALUES (?, NULL, 0, 0, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(username) DO UPDATE SET
                directory_account = excluded.directory_account,
                directory_domain = excluded.directory_domain,
                display_name = COALESCE(excluded.display_name, users.display_name),
                email = COALESCE(excluded.email, users.email),
                last_directory_sync = excluded.last_directory_sync,
                updated_at = excluded.updated_at
            WHERE users.kind = 'directory'
            "#,
        )
        .bind(&username)
        .bind(UserKind::Directory)
        .bind(&entry.account_name)
        .bind(&entry.domain)
        .bind(&entry.display_name)
        .bind(&entry.email)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.db_pool)
        .await?;

        self.get(&username).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, db};

    async fn service() -> UserService {
        let pool = db::create_pool(&Config::for_tests()).await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        UserService::new(pool, 4, "fallback_admin".to_string())
    }

    fn entry(account: &str) -> DirectoryEntry {
        DirectoryEntry {
            dn: format!("CN={},CN=Users,DC=company,DC=com", account),
            account_name: account.to_string(),
            display_name: Some("John Smith".to_string()),
            email: Some("john.smith@company.com".to_string()),
            domain: Some("company.com".to_string()),
            groups: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_create_normalizes_and_rejects_duplicates() {
        let users = service().await;
        let user = users
            .create_local("COMPANY\\Alice", "password1", 0, false, "admin")
            .await
            .unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.kind, UserKind::Local);

        let dup = users
            .create_local("alice@company.com", "password1", 0, false, "admin")
            .await;
        assert!(matches!(dup, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_initial_balance_is_logged() {
        let users = service().await;
        users
            .create_local("bob", "password1", 250, false, "fallback_admin")
            .await
            .unwrap();

        let (amount, kind): (i64, String) = sqlx::query_as(
            "SELECT amount, transaction_type FROM currency_transactions WHERE username = 'bob'",
        )
        .fetch_one(&users.db_pool)
        .await
        .unwrap();
        assert_eq!(amount, 250);
        assert_eq!(kind, "initial_balance");
    }

    #[tokio::test]
    async fn test_fallback_admin_is_protected() {
        let users = service().await;
        assert!(users.ensure_fallback_admin("ChangeMe123!").await.unwrap());
        assert!(!users.ensure_fallback_admin("ChangeMe123!").await.unwrap());
        assert!(users.is_admin("fallback_admin").await.unwrap());

        assert!(matches!(
            users.delete("fallback_admin").await,
            Err(StoreError::Forbidden(_))
        ));

        let demote = UpdateUserRequest {
            is_admin: Some(false),
            ..Default::default()
        };
        assert!(matches!(
            users.update("fallback_admin", demote).await,
            Err(StoreError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_local_vs_directory() {
        let users = service().await;
        users
            .create_local("carol", "password1", 0, false, "admin")
            .await
            .unwrap();
        users.upsert_directory_user(&entry("jsmith")).await.unwrap();

        assert_eq!(users.delete("carol").await.unwrap(), Removal::Deleted);
        assert!(users.find("carol").await.unwrap().is_none());

        assert_eq!(users.delete("jsmith").await.unwrap(), Removal::Deactivated);
        let jsmith = users.get("jsmith").await.unwrap();
        assert!(!jsmith.is_active);
        assert!(!users.is_admin("jsmith").await.unwrap());

        let jsmith = users.reactivate("jsmith").await.unwrap();
        assert!(jsmith.is_active);
    }

    #[tokio::test]
    async fn test_upsert_directory_user_refreshes() {
        let users = service().await;
        let first = users.upsert_directory_user(&entry("JSmith")).await.unwrap();
        assert_eq!(first.username, "jsmith");
        assert_eq!(first.kind, UserKind::Directory);
        assert!(first.password_hash.is_none());
        assert!(!first.is_admin);

        let mut changed = entry("jsmith");
        changed.display_name = Some("Johnny Smith".to_string());
        let second = users.upsert_directory_user(&changed).await.unwrap();
        assert_eq!(second.display_name.as_deref(), Some("Johnny Smith"));
        assert_eq!(users.list(Some(UserKind::Directory)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_leaves_local_account_alone() {
        let users = service().await;
        users
            .create_local("jsmith", "password1", 0, false, "admin")
            .await
            .unwrap();
        let user = users.upsert_directory_user(&entry("jsmith")).await.unwrap();
        assert_eq!(user.kind, UserKind::Local);
        assert!(user.display_name.is_none());
    }

    #[tokio::test]
    async fn test_update_partial() {
        let users = service().await;
        users
            .create_local("dave", "password1", 0, false, "admin")
            .await
            .unwrap();

        let updated = users
            .update(
                "dave",
                UpdateUserRequest {
                    is_admin: Some(true),
                    display_name: Some("Dave".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.is_admin);
        assert_eq!(updated.display_name.as_deref(), Some("Dave"));

        assert!(matches!(
            users.update("nobody", UpdateUserRequest::default()).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
