//! Configuration management for the store
//!
//! This module handles loading and validating configuration from environment variables,
//! with support for different environments (development, staging, production).

use std::env;
use std::path::PathBuf;
use thiserror::Error;

use crate::auth::BindMode;

/// Placeholder domain shipped in sample configuration files.
pub const PLACEHOLDER_DOMAIN: &str = "yourdomain.com";

/// Default password of the fallback admin account.
pub const DEFAULT_ADMIN_PASSWORD: &str = "ChangeMe123!";

/// Image extensions accepted for item pictures.
pub const ALLOWED_IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),
}

/// Application environment
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Parse environment from string
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }

    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Get the environment name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

/// Active Directory settings
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub enabled: bool,
    pub server_url: String,
    pub domain: String,
    pub bind_dn: String,
    pub bind_password: String,
    pub user_base_dn: String,
    pub user_filter: String,
    pub use_ssl: bool,
    pub port: u16,
    pub timeout_seconds: u64,
    /// Bind with the user's own credentials instead of a service account
    pub simple_bind_mode: bool,
    /// Pattern used to build the bind DN in simple bind mode
    pub user_dn_pattern: String,
    /// Serve authentication from the built-in mock directory
    pub use_mock: bool,
}

impl DirectoryConfig {
    pub fn mode(&self) -> BindMode {
        if self.simple_bind_mode {
            BindMode::SimpleBind
        } else {
            BindMode::ServiceAccount
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_url: "ldap://your-dc.yourdomain.com".to_string(),
            domain: PLACEHOLDER_DOMAIN.to_string(),
            bind_dn: "CN=service_account,OU=Service Accounts,DC=yourdomain,DC=com".to_string(),
            bind_password: String::new(),
            user_base_dn: "OU=Users,DC=yourdomain,DC=com".to_string(),
            user_filter: "(objectClass=user)".to_string(),
            use_ssl: true,
            port: 636,
            timeout_seconds: 10,
            simple_bind_mode: false,
            user_dn_pattern: "{username}@{domain}".to_string(),
            use_mock: false,
        }
    }
}

/// Outbound notification settings
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub enabled: bool,
    /// HTTP mail relay that accepts JSON messages
    pub relay_url: Option<String>,
    pub from_address: String,
    pub fulfillment_address: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            relay_url: None,
            from_address: "nesop-store@yourdomain.com".to_string(),
            fulfillment_address: None,
            timeout_seconds: 30,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Current environment
    pub environment: Environment,

    /// Address the server binds to
    pub bind_address: String,

    /// Server port
    pub port: u16,

    /// Maximum database connections
    pub db_max_connections: u32,

    /// Rate limit: requests per second per IP
    pub rate_limit_rps: u32,

    /// CORS allowed origins
    pub cors_allowed_origins: Option<String>,

    /// Log level (RUST_LOG)
    pub log_level: String,

    /// JWT secret for token signing
    pub jwt_secret: String,

    /// Access token TTL in seconds (default: 900 = 15 minutes)
    pub jwt_access_token_ttl_seconds: i64,

    /// Refresh token TTL in days (default: 7)
    pub jwt_refresh_token_ttl_days: i64,

    /// Failed logins tolerated per window before the account is throttled
    pub login_max_attempts: usize,

    /// Failed-login window in seconds
    pub login_window_seconds: u64,

    /// Folder item images are written to
    pub upload_folder: PathBuf,

    /// Maximum accepted image size in bytes
    pub max_file_size: usize,

    /// bcrypt work factor for stored passwords
    pub password_hash_cost: u32,

    /// Bootstrap administrator
    pub local_admin_username: String,
    pub local_admin_password: String,

    pub directory: DirectoryConfig,

    pub notifications: NotificationConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .map(|s| Environment::parse(&s))
            .unwrap_or(Ok(Environment::Development))?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://store.db".to_string());

        let bind_address = env::var("BIND_ADDRESS").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "8001".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort("PORT must be a valid number".to_string()))?;

        let db_max_connections = parse_or("DB_MAX_CONNECTIONS", 5u32);
        let rate_limit_rps = parse_or("RATE_LIMIT_RPS", 100u32);
        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS").ok();
        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let jwt_secret = env::var("JWT_SECRET")
            .unwrap_or_else(|_| "development-secret-change-in-production".to_string());
        if environment.is_production() && env::var("JWT_SECRET").is_err() {
            return Err(ConfigError::MissingEnvVar("JWT_SECRET".to_string()));
        }

        let directory = DirectoryConfig::from_env();
        let notifications = NotificationConfig::from_env();

        Ok(Config {
            database_url,
            environment,
            bind_address,
            port,
            db_max_connections,
            rate_limit_rps,
            cors_allowed_origins,
            log_level,
            jwt_secret,
            jwt_access_token_ttl_seconds: parse_or("JWT_ACCESS_TOKEN_TTL_SECONDS", 900i64),
            jwt_refresh_token_ttl_days: parse_or("JWT_REFRESH_TOKEN_TTL_DAYS", 7i64),
            login_max_attempts: parse_or("LOGIN_MAX_ATTEMPTS", 3usize),
            login_window_seconds: parse_or("LOGIN_WINDOW_SECONDS", 300u64),
            upload_folder: PathBuf::from(
                env::var("UPLOAD_FOLDER").unwrap_or_else(|_| "assets/images".to_string()),
            ),
            max_file_size: parse_or("MAX_FILE_SIZE", 16 * 1024 * 1024usize),
            password_hash_cost: parse_or("BCRYPT_COST", bcrypt::DEFAULT_COST),
            local_admin_username: env::var("LOCAL_ADMIN_USERNAME")
                .unwrap_or_else(|_| "fallback_admin".to_string()),
            local_admin_password: env::var("LOCAL_ADMIN_PASSWORD")
                .unwrap_or_else(|_| DEFAULT_ADMIN_PASSWORD.to_string()),
            directory,
            notifications,
        })
    }

    /// Get database URL (useful for logging masked version)
    pub fn database_url_masked(&self) -> String {
        // Mask password in database URL for logging
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                let prefix = &self.database_url[..colon_pos + 1];
                let suffix = &self.database_url[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
        self.database_url.clone()
    }

    /// Settings that work but should not reach production as-is
    pub fn validation_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.local_admin_password == DEFAULT_ADMIN_PASSWORD {
            warnings.push("Local admin password is still set to default".to_string());
        }

        if self.directory.enabled && !self.directory.use_mock {
            if self.directory.server_url.is_empty()
                || self.directory.server_url.contains(PLACEHOLDER_DOMAIN)
            {
                warnings.push("Directory is enabled but server URL is not configured".to_string());
            }
            if !self.directory.simple_bind_mode && self.directory.bind_password.is_empty() {
                warnings.push("Directory is enabled but bind password is not set".to_string());
            }
        }

        if self.environment.is_production() && self.directory.use_mock {
            warnings.push(
                "USE_MOCK_AD is set in production; sample directory accounts can sign in".to_string(),
            );
        }

        if self.notifications.enabled && self.notifications.relay_url.is_none() {
            warnings.push("Notifications are enabled but NOTIFY_RELAY_URL is not set".to_string());
        }

        warnings
    }

    /// Check an uploaded file name against the allowed image extensions
    pub fn is_allowed_image(filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                let ext = ext.to_lowercase();
                ALLOWED_IMAGE_EXTENSIONS.contains(&ext.as_str())
            }
            _ => false,
        }
    }

    /// Configuration usable in tests and local tooling
    pub fn for_tests() -> Self {
        Config {
            database_url: "sqlite::memory:".to_string(),
            environment: Environment::Development,
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            db_max_connections: 1,
            rate_limit_rps: 1000,
            cors_allowed_origins: None,
            log_level: "info".to_string(),
            jwt_secret: "test-secret".to_string(),
            jwt_access_token_ttl_seconds: 900,
            jwt_refresh_token_ttl_days: 7,
            login_max_attempts: 3,
            login_window_seconds: 300,
            upload_folder: std::env::temp_dir().join("nesop-store-test-images"),
            max_file_size: 1024 * 1024,
            password_hash_cost: 4,
            local_admin_username: "fallback_admin".to_string(),
            local_admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
            directory: DirectoryConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl DirectoryConfig {
    fn from_env() -> Self {
        let defaults = DirectoryConfig::default();
        DirectoryConfig {
            enabled: flag("AD_ENABLED", false),
            server_url: env::var("AD_SERVER_URL").unwrap_or(defaults.server_url),
            domain: env::var("AD_DOMAIN").unwrap_or(defaults.domain),
            bind_dn: env::var("AD_BIND_DN").unwrap_or(defaults.bind_dn),
            bind_password: env::var("AD_BIND_PASSWORD").unwrap_or(defaults.bind_password),
            user_base_dn: env::var("AD_USER_BASE_DN").unwrap_or(defaults.user_base_dn),
            user_filter: env::var("AD_USER_FILTER").unwrap_or(defaults.user_filter),
            use_ssl: flag("AD_USE_SSL", true),
            port: parse_or("AD_PORT", defaults.port),
            timeout_seconds: parse_or("AD_TIMEOUT", defaults.timeout_seconds),
            simple_bind_mode: flag("AD_SIMPLE_BIND_MODE", false),
            user_dn_pattern: env::var("AD_USER_DN_PATTERN").unwrap_or(defaults.user_dn_pattern),
            use_mock: flag("USE_MOCK_AD", false),
        }
    }
}

impl NotificationConfig {
    fn from_env() -> Self {
        let defaults = NotificationConfig::default();
        NotificationConfig {
            enabled: flag("NOTIFY_ENABLED", false),
            relay_url: env::var("NOTIFY_RELAY_URL").ok().filter(|s| !s.is_empty()),
            from_address: env::var("NOTIFY_FROM_ADDRESS").unwrap_or(defaults.from_address),
            fulfillment_address: env::var("NOTIFY_FULFILLMENT_ADDRESS")
                .ok()
                .filter(|s| !s.is_empty()),
            timeout_seconds: parse_or("NOTIFY_TIMEOUT", defaults.timeout_seconds),
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| parse_flag(&v))
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
