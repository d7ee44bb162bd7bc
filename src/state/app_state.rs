//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::SqlitePool;

use crate::auth::{AuthService, DirectoryAuthenticator, DirectoryClient};
use crate::config::Config;
use crate::middleware::RateLimiter;
use crate::notify::NotificationService;
use crate::services::{
    AuditLog, CatalogService, DirectoryAdminService, LedgerService, OrderService, ReviewService,
    UserService,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub auth_service: Arc<AuthService>,
    pub user_service: Arc<UserService>,
    pub catalog_service: Arc<CatalogService>,
    pub review_service: Arc<ReviewService>,
    pub order_service: Arc<OrderService>,
    pub ledger_service: Arc<LedgerService>,
    pub directory_admin: Arc<DirectoryAdminService>,
    pub notifications: NotificationService,
    pub audit: AuditLog,
    pub rate_limiter: RateLimiter,
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth_service.clone()
    }
}

impl FromRef<AppState> for Arc<UserService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.user_service.clone()
    }
}

impl FromRef<AppState> for Arc<CatalogService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.catalog_service.clone()
    }
}

impl FromRef<AppState> for Arc<OrderService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.order_service.clone()
    }
}

impl FromRef<AppState> for Arc<LedgerService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.ledger_service.clone()
    }
}

impl AppState {
    /// Wire every service on top of one pool
    pub fn new(
        db_pool: SqlitePool,
        config: &Config,
        directory_client: Arc<dyn DirectoryClient>,
        notifications: NotificationService,
    ) -> Self {
        let audit = AuditLog::new(db_pool.clone());
        let users = UserService::new(
            db_pool.clone(),
            config.password_hash_cost,
            config.local_admin_username.clone(),
        );
        let directory =
            DirectoryAuthenticator::new(directory_client, config.directory.clone(), audit.clone());

        let auth_service = AuthService::new(
            db_pool.clone(),
            users.clone(),
            directory.clone(),
            audit.clone(),
            config,
        );

        Self {
            auth_service: Arc::new(auth_service),
            user_service: Arc::new(users.clone()),
            catalog_service: Arc::new(CatalogService::new(
                db_pool.clone(),
                config.upload_folder.clone(),
                config.max_file_size,
            )),
            review_service: Arc::new(ReviewService::new(db_pool.clone())),
            order_service: Arc::new(OrderService::new(db_pool.clone(), notifications.clone())),
            ledger_service: Arc::new(LedgerService::new(db_pool.clone(), notifications.clone())),
            directory_admin: Arc::new(DirectoryAdminService::new(directory, users, audit.clone())),
            notifications,
            audit,
            rate_limiter: RateLimiter::new(config.rate_limit_rps),
            db_pool,
        }
    }
}
