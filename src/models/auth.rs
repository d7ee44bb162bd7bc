//! Account and session models

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use validator::Validate;

/// How an account authenticates
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserKind {
    Local,
    Directory,
}

impl UserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserKind::Local => "local",
            UserKind::Directory => "directory",
        }
    }
}

/// User model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct User {
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub balance: i64,
    pub is_admin: bool,
    pub kind: UserKind,
    pub directory_account: Option<String>,
    pub directory_domain: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub last_directory_sync: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> &'static str {
        if self.is_admin {
            "admin"
        } else {
            "user"
        }
    }
}

/// Columns selected whenever a full `User` row is loaded
pub const USER_COLUMNS: &str = "username, password_hash, balance, is_admin, kind, \
    directory_account, directory_domain, display_name, email, last_directory_sync, \
    is_active, created_at, updated_at";

/// Authentication session for JWT tracking
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct AuthSession {
    pub id: String,
    pub username: String,
    pub jti: String,
    pub refresh_token_hash: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// Self-service registration of a local account
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 64))]
    pub username: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

/// Username/password login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Auth tokens response
#[derive(Debug, Serialize)]
pub struct AuthTokensResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserResponse,
}

/// User response (sanitized for API)
#[derive(Debug, Serialize, Clone)]
pub struct UserResponse {
    pub username: String,
    pub balance: i64,
    pub is_admin: bool,
    pub kind: UserKind,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub is_active: bool,
    pub last_directory_sync: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            balance: user.balance,
            is_admin: user.is_admin,
            kind: user.kind,
            display_name: user.display_name,
            email: user.email,
            is_active: user.is_active,
            last_directory_sync: user.last_directory_sync,
            created_at: user.created_at,
        }
    }
}

/// Refresh token request
#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Public view of the directory configuration
#[derive(Debug, Serialize)]
pub struct DirectoryStatusResponse {
    pub enabled: bool,
    pub mode: String,
    pub mock: bool,
    pub domain: String,
}

/// Admin creation of an account
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 64))]
    pub username: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub balance: i64,
    #[serde(default)]
    pub is_admin: bool,
}

/// Partial account update
#[derive(Debug, Deserialize, Validate, Default)]
pub struct UpdateUserRequest {
    #[validate(length(min = 8, max = 128))]
    pub password: Option<String>,
    pub is_admin: Option<bool>,
    #[validate(length(max = 128))]
    pub display_name: Option<String>,
}

/// Query string for the user listing
#[derive(Debug, Deserialize, Default)]
pub struct UserListQuery {
    pub kind: Option<UserKind>,
}

/// Result of a delete request
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Removal {
    Deleted,
    Deactivated,
}

/// Which check accepted a login
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    Local,
    Directory,
}

/// Tokens plus the method that authenticated the user
#[derive(Debug, Serialize)]
pub struct LoginOutcome {
    #[serde(flatten)]
    pub tokens: AuthTokensResponse,
    pub method: LoginMethod,
}
