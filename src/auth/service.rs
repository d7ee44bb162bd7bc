//! Authentication service
//!
//! Login decides between the local password check and the directory, applies
//! the failed-login throttle, and issues JWT access/refresh tokens backed by
//! a row in `sessions`.

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    AuthSession, AuthTokensResponse, DirectoryStatusResponse, LoginMethod, LoginOutcome, User,
    UserKind, UserResponse,
};
use crate::services::{AuditLog, ClientContext, UserService};

use super::directory::{DirectoryAuthenticator, DirectoryError};
use super::jwt::{generate_access_token, generate_refresh_token, verify_token, JwtError};
use super::password::verify_password;
use super::throttle::LoginThrottle;

const SESSION_COLUMNS: &str = "id, username, jti, refresh_token_hash, ip_address, user_agent, \
    expires_at, revoked, revoked_at, created_at, updated_at";

impl From<JwtError> for StoreError {
    fn from(e: JwtError) -> Self {
        match e {
            JwtError::EncodingFailed(msg) => StoreError::Internal(msg),
            JwtError::TokenExpired => StoreError::Unauthorized("Token has expired".to_string()),
            JwtError::DecodingFailed(_) => StoreError::Unauthorized("Invalid token".to_string()),
        }
    }
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db_pool: SqlitePool,
    users: UserService,
    directory: DirectoryAuthenticator,
    throttle: LoginThrottle,
    audit: AuditLog,
    jwt_secret: String,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_days: i64,
}

impl AuthService {
    pub fn new(
        db_pool: SqlitePool,
        users: UserService,
        directory: DirectoryAuthenticator,
        audit: AuditLog,
        config: &Config,
    ) -> Self {
        Self {
            db_pool,
            users,
            directory,
            throttle: LoginThrottle::new(
                config.login_max_attempts,
                std::time::Duration::from_secs(config.login_window_seconds),
            ),
            audit,
            jwt_secret: config.jwt_secret.clone(),
            access_token_ttl_seconds: config.jwt_access_token_ttl_seconds,
            refresh_token_ttl_days: config.jwt_refresh_token_ttl_days,
        }
    }

    pub fn jwt_secret(&self) -> &str {
        &self.jwt_secret
    }

    pub fn throttle(&self) -> &LoginThrottle {
        &self.throttle
    }

    pub fn users(&self) -> &UserService {
        &self.users
    }

    pub fn directory_status(&self) -> DirectoryStatusResponse {
        let config = self.directory.config();
        DirectoryStatusResponse {
            enabled: config.enabled,
            mode: config.mode().as_str().to_string(),
            mock: config.use_mock,
            domain: config.domain.clone(),
        }
    }

    /// Self-service registration of a local, non-admin account
    pub async fn register(&self, username: &str, password: &str) -> StoreResult<UserResponse> {
        let user = self
            .users
            .create_local(username, password, 0, false, "self-registration")
            .await?;
        Ok(user.into())
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
        ctx: &ClientContext,
    ) -> StoreResult<LoginOutcome> {
        // Passwords are stored exactly as given, so only the username is trimmed
        let raw = username.trim();
        if raw.is_empty() || password.is_empty() {
            return Err(StoreError::Invalid(
                "Username and password are required".to_string(),
            ));
        }

        let normalized = self.directory.account_name(raw);
        if self.throttle.is_locked(&normalized).await {
            tracing::warn!(username = %normalized, "Login throttled");
            return Err(StoreError::Throttled);
        }

        match self.authenticate(raw, &normalized, password, ctx).await {
            Ok((user, method)) => {
                self.throttle.clear(&normalized).await;
                let tokens = self.issue_tokens(user, ctx).await?;
                tracing::info!(
                    username = %tokens.user.username,
                    method = ?method,
                    "Login succeeded"
                );
                Ok(LoginOutcome { tokens, method })
            }
            Err(e @ (StoreError::InvalidCredentials | StoreError::AccountDisabled)) => {
                self.throttle.record_failure(&normalized).await;
                tracing::warn!(username = %normalized, error = %e, "Login failed");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn authenticate(
        &self,
        raw: &str,
        normalized: &str,
        password: &str,
        ctx: &ClientContext,
    ) -> StoreResult<(User, LoginMethod)> {
        let existing = self.users.find_any(raw, normalized).await?;

        if let Some(user) = existing.as_ref().filter(|u| u.kind == UserKind::Local) {
            return self.check_local(user, password, ctx).await;
        }

        if self.directory.is_enabled() {
            match self.directory.authenticate(raw, password, ctx).await {
                Ok(Some(entry)) => {
                    let user = self.users.upsert_directory_user(&entry).await?;
                    if user.kind != UserKind::Directory {
                        tracing::warn!(
                            username = %user.username,
                            "Directory login maps onto a local account; rejected"
                        );
                        return Err(StoreError::InvalidCredentials);
                    }
                    if !user.is_active {
                        return Err(StoreError::AccountDisabled);
                    }
                    return Ok((user, LoginMethod::Directory));
                }
                Ok(None) => {}
                Err(DirectoryError::Disabled) => {}
                Err(e) => {
                    let has_local_hash = existing
                        .as_ref()
                        .map(|u| u.password_hash.is_some())
                        .unwrap_or(false);
                    if !has_local_hash {
                        return Err(StoreError::Unavailable(format!(
                            "Directory authentication is unavailable: {}",
                            e
                        )));
                    }
                    tracing::warn!(error = %e, "Directory unavailable, trying local password");
                }
            }
        }

        match existing.as_ref() {
            Some(user) => self.check_local(user, password, ctx).await,
            None => Err(StoreError::InvalidCredentials),
        }
    }

    async fn check_local(
        &self,
        user: &User,
        password: &str,
        ctx: &ClientContext,
    ) -> StoreResult<(User, LoginMethod)> {
        let valid = user
            .password_hash
            .as_deref()
            .map(|hash| verify_password(password, hash))
            .unwrap_or(false);

        let error = match (valid, user.is_active) {
            (true, true) => None,
            (true, false) => Some(StoreError::AccountDisabled),
            (false, _) => Some(StoreError::InvalidCredentials),
        };

        let failure = error.as_ref().map(|e| e.to_string());
        self.audit
            .record(
                &user.username,
                if error.is_none() {
                    "local_auth_success"
                } else {
                    "local_auth_failure"
                },
                None,
                ctx,
                error.is_none(),
                failure.as_deref(),
            )
            .await;

        match error {
            None => Ok((user.clone(), LoginMethod::Local)),
            Some(e) => Err(e),
        }
    }

    async fn issue_tokens(&self, user: User, ctx: &ClientContext) -> StoreResult<AuthTokensResponse> {
        let jti = Uuid::new_v4().to_string();
        let access_token =
            generate_access_token(&user, &jti, &self.jwt_secret, self.access_token_ttl_seconds)?;

        let refresh_jti = Uuid::new_v4().to_string();
        let refresh_token = generate_refresh_token(
            &user,
            &refresh_jti,
            &self.jwt_secret,
            self.refresh_token_ttl_days,
        )?;

        let now = Utc::now();
        let session_expires_at = now + Duration::days(self.refresh_token_ttl_days);

        sqlx::query(
            r#"
            INSERT INTO sessions (id, username, jti, refresh_token_hash, ip_address, user_agent, expires_at, revoked, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&user.username)
        .bind(&jti)
        .bind(hash_token(&refresh_token))
        .bind(&ctx.ip_address)
        .bind(&ctx.user_agent)
        .bind(session_expires_at)
        .bind(now)
        .bind(now)
        .execute(&self.db_pool)
        .await?;

        Ok(AuthTokensResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_ttl_seconds,
            user: user.into(),
        })
    }

    /// Refresh tokens using a valid refresh token. The old refresh token stops working.
    pub async fn refresh_tokens(&self, refresh_token: &str) -> StoreResult<AuthTokensResponse> {
        let claims = verify_token(refresh_token, &self.jwt_secret)?;
        if claims.token_type != "refresh" {
            return Err(StoreError::Unauthorized("Invalid refresh token".to_string()));
        }

        let session: AuthSession = sqlx::query_as(&format!(
            "SELECT {} FROM sessions WHERE refresh_token_hash = ? AND revoked = 0 AND expires_at > ?",
            SESSION_COLUMNS
        ))
        .bind(hash_token(refresh_token))
        .bind(Utc::now())
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| StoreError::Unauthorized("Session not found or revoked".to_string()))?;

        let user = self.users.get(&session.username).await?;
        if !user.is_active {
            return Err(StoreError::AccountDisabled);
        }

        let jti = Uuid::new_v4().to_string();
        let access_token =
            generate_access_token(&user, &jti, &self.jwt_secret, self.access_token_ttl_seconds)?;

        let refresh_jti = Uuid::new_v4().to_string();
        let new_refresh_token = generate_refresh_token(
            &user,
            &refresh_jti,
            &self.jwt_secret,
            self.refresh_token_ttl_days,
        )?;

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE sessions
            SET jti = ?, refresh_token_hash = ?, expires_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&jti)
        .bind(hash_token(&new_refresh_token))
        .bind(now + Duration::days(self.refresh_token_ttl_days))
        .bind(now)
        .bind(&session.id)
        .execute(&self.db_pool)
        .await?;

        Ok(AuthTokensResponse {
            access_token,
            refresh_token: new_refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_ttl_seconds,
            user: user.into(),
        })
    }

    /// Revoke a session (logout)
    pub async fn revoke_session(&self, jti: &str) -> StoreResult<()> {
        let now = Utc::now();
        let rows_affected = sqlx::query(
            "UPDATE sessions SET revoked = 1, revoked_at = ?, updated_at = ? WHERE jti = ? AND revoked = 0",
        )
        .bind(now)
        .bind(now)
        .bind(jti)
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(StoreError::Unauthorized(
                "Session not found or revoked".to_string(),
            ));
        }

        Ok(())
    }

    /// Revoke all sessions for a user
    pub async fn revoke_all_sessions(&self, username: &str) -> StoreResult<u64> {
        let now = Utc::now();
        let rows_affected = sqlx::query(
            "UPDATE sessions SET revoked = 1, revoked_at = ?, updated_at = ? WHERE username = ? AND revoked = 0",
        )
        .bind(now)
        .bind(now)
        .bind(username)
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        tracing::info!(username = %username, revoked = rows_affected, "Sessions revoked");
        Ok(rows_affected)
    }

    /// Verify a session is valid (not revoked, not expired)
    pub async fn verify_session(&self, jti: &str) -> StoreResult<AuthSession> {
        sqlx::query_as(&format!(
            "SELECT {} FROM sessions WHERE jti = ? AND revoked = 0 AND expires_at > ?",
            SESSION_COLUMNS
        ))
        .bind(jti)
        .bind(Utc::now())
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| StoreError::Unauthorized("Session has been revoked".to_string()))
    }

    /// Delete revoked and expired sessions
    pub async fn purge_expired_sessions(&self) -> StoreResult<u64> {
        let purged = sqlx::query("DELETE FROM sessions WHERE revoked = 1 OR expires_at <= ?")
            .bind(Utc::now())
            .execute(&self.db_pool)
            .await?
            .rows_affected();

        if purged > 0 {
            tracing::info!(purged, "Purged stale sessions");
        }
        Ok(purged)
    }
}

/// Hash a token for storage
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{DirectoryClient, MockDirectory, OfflineDirectory, MOCK_PASSWORD};
    use crate::config::DirectoryConfig;
    use crate::db;
    use std::sync::Arc;

    fn directory_config(enabled: bool) -> DirectoryConfig {
        DirectoryConfig {
            enabled,
            domain: "company.com".to_string(),
            bind_dn: "CN=svc,DC=company,DC=com".to_string(),
            bind_password: "svc-secret".to_string(),
            user_base_dn: "CN=Users,DC=company,DC=com".to_string(),
            simple_bind_mode: false,
            ..DirectoryConfig::default()
        }
    }

    async fn service_with(
        client: Arc<dyn DirectoryClient>,
        directory_enabled: bool,
    ) -> AuthService {
        let config = Config::for_tests();
        let pool = db::create_pool(&config).await.unwrap();
        db::run_migrations(&pool).await.unwrap();

        let audit = AuditLog::new(pool.clone());
        let users = UserService::new(pool.clone(), 4, config.local_admin_username.clone());
        users.ensure_fallback_admin("AdminPass123").await.unwrap();
        users.create_local("alice", "alice-password", 10, false, "test").await.unwrap();

        let directory =
            DirectoryAuthenticator::new(client, directory_config(directory_enabled), audit.clone());
        AuthService::new(pool, users, directory, audit, &config)
    }

    async fn service(directory_enabled: bool) -> AuthService {
        let client = Arc::new(MockDirectory::with_sample_accounts(
            "CN=svc,DC=company,DC=com",
            "svc-secret",
        ));
        service_with(client, directory_enabled).await
    }

    #[test]
    fn test_hash_token_is_stable() {
        assert_eq!(hash_token("abc"), hash_token("abc"));
        assert_ne!(hash_token("abc"), hash_token("abd"));
        assert_eq!(hash_token("abc").len(), 64);
    }

    #[tokio::test]
    async fn test_password_whitespace_is_significant() {
        let auth = service(false).await;
        let ctx = ClientContext::default();

        auth.register("pat", "  padded-secret  ").await.unwrap();
        assert!(auth.login(" pat ", "  padded-secret  ", &ctx).await.is_ok());
        assert!(matches!(
            auth.login("pat", "padded-secret", &ctx).await,
            Err(StoreError::InvalidCredentials)
        ));

        auth.register("sam", "        ").await.unwrap();
        assert!(auth.login("sam", "        ", &ctx).await.is_ok());
    }

    #[tokio::test]
    async fn test_local_login_and_session() {
        let auth = service(false).await;
        let ctx = ClientContext::default();

        let outcome = auth.login("alice", "alice-password", &ctx).await.unwrap();
        assert_eq!(outcome.method, LoginMethod::Local);
        assert_eq!(outcome.tokens.user.username, "alice");

        let claims = verify_token(&outcome.tokens.access_token, auth.jwt_secret()).unwrap();
        assert!(auth.verify_session(&claims.jti).await.is_ok());

        auth.revoke_session(&claims.jti).await.unwrap();
        assert!(auth.verify_session(&claims.jti).await.is_err());
        assert!(auth.revoke_session(&claims.jti).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let auth = service(false).await;
        let ctx = ClientContext::default();
        assert!(matches!(
            auth.login("  ", "x", &ctx).await,
            Err(StoreError::Invalid(_))
        ));
        assert!(matches!(
            auth.login("alice", "   ", &ctx).await,
            Err(StoreError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_throttle_after_failures() {
        let auth = service(false).await;
        let ctx = ClientContext::default();

        for _ in 0..3 {
            assert!(matches!(
                auth.login("alice", "wrong", &ctx).await,
                Err(StoreError::InvalidCredentials)
            ));
        }
        assert!(matches!(
            auth.login("ALICE@company.com", "alice-password", &ctx).await,
            Err(StoreError::Throttled)
        ));
    }

    #[tokio::test]
    async fn test_success_clears_failures() {
        let auth = service(false).await;
        let ctx = ClientContext::default();

        auth.login("alice", "wrong", &ctx).await.unwrap_err();
        auth.login("alice", "wrong", &ctx).await.unwrap_err();
        auth.login("alice", "alice-password", &ctx).await.unwrap();
        auth.login("alice", "wrong", &ctx).await.unwrap_err();
        auth.login("alice", "wrong", &ctx).await.unwrap_err();
        assert!(auth.login("alice", "alice-password", &ctx).await.is_ok());
    }

    #[tokio::test]
    async fn test_directory_login_imports_user() {
        let auth = service(true).await;
        let ctx = ClientContext::default();

        let outcome = auth
            .login("COMPANY\\JSmith", MOCK_PASSWORD, &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.method, LoginMethod::Directory);
        assert_eq!(outcome.tokens.user.username, "jsmith");
        assert_eq!(outcome.tokens.user.kind, UserKind::Directory);
        assert!(!outcome.tokens.user.is_admin);
        assert_eq!(
            outcome.tokens.user.display_name.as_deref(),
            Some("John Smith")
        );

        assert!(matches!(
            auth.login("jsmith", "nope", &ctx).await,
            Err(StoreError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_fallback_admin_skips_directory() {
        let auth = service_with(Arc::new(OfflineDirectory::new("ldaps://dc")), true).await;
        let ctx = ClientContext::default();

        let outcome = auth
            .login("fallback_admin", "AdminPass123", &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.method, LoginMethod::Local);
        assert!(outcome.tokens.user.is_admin);
    }

    #[tokio::test]
    async fn test_directory_outage_without_local_password() {
        let auth = service_with(Arc::new(OfflineDirectory::new("ldaps://dc")), true).await;
        let ctx = ClientContext::default();

        assert!(matches!(
            auth.login("jsmith", MOCK_PASSWORD, &ctx).await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_deactivated_directory_user_cannot_login() {
        let auth = service(true).await;
        let ctx = ClientContext::default();

        auth.login("mjohnson", MOCK_PASSWORD, &ctx).await.unwrap();
        auth.users().delete("mjohnson").await.unwrap();

        assert!(matches!(
            auth.login("mjohnson", MOCK_PASSWORD, &ctx).await,
            Err(StoreError::AccountDisabled)
        ));
    }

    #[tokio::test]
    async fn test_refresh_rotates_tokens() {
        let auth = service(false).await;
        let ctx = ClientContext::default();

        let outcome = auth.login("alice", "alice-password", &ctx).await.unwrap();
        let refreshed = auth
            .refresh_tokens(&outcome.tokens.refresh_token)
            .await
            .unwrap();
        assert_ne!(refreshed.refresh_token, outcome.tokens.refresh_token);

        assert!(auth
            .refresh_tokens(&outcome.tokens.refresh_token)
            .await
            .is_err());
        assert!(auth
            .refresh_tokens(&outcome.tokens.access_token)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_revoke_all_and_purge() {
        let auth = service(false).await;
        let ctx = ClientContext::default();

        auth.login("alice", "alice-password", &ctx).await.unwrap();
        auth.login("alice", "alice-password", &ctx).await.unwrap();

        assert_eq!(auth.revoke_all_sessions("alice").await.unwrap(), 2);
        assert_eq!(auth.purge_expired_sessions().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_register() {
        let auth = service(false).await;
        let user = auth.register("Bob@company.com", "bob-password").await.unwrap();
        assert_eq!(user.username, "bob");
        assert!(!user.is_admin);
        assert_eq!(user.balance, 0);

        assert!(matches!(
            auth.register("bob", "other-password").await,
            Err(StoreError::Conflict(_))
        ));
        assert!(auth
            .login("bob", "bob-password", &ClientContext::default())
            .await
            .is_ok());
    }
}
