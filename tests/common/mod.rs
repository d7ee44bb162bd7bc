//! Shared setup for the HTTP-level tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use nesop_store::auth::{MockDirectory, MOCK_PASSWORD};
use nesop_store::build_router;
use nesop_store::config::{Config, DirectoryConfig, NotificationConfig};
use nesop_store::db;
use nesop_store::notify::{LogNotifier, NotificationService};
use nesop_store::state::AppState;

pub const ADMIN_USERNAME: &str = "fallback_admin";
pub const ADMIN_PASSWORD: &str = "AdminPass123";
pub const DIRECTORY_PASSWORD: &str = MOCK_PASSWORD;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub directory: Arc<MockDirectory>,
}

fn test_config() -> Config {
    let mut config = Config::for_tests();
    config.upload_folder =
        std::env::temp_dir().join(format!("nesop-store-it-{}", uuid::Uuid::new_v4()));
    config.directory = DirectoryConfig {
        enabled: true,
        use_mock: true,
        domain: "company.com".to_string(),
        bind_dn: "CN=svc,DC=company,DC=com".to_string(),
        bind_password: "svc-secret".to_string(),
        user_base_dn: "CN=Users,DC=company,DC=com".to_string(),
        ..DirectoryConfig::default()
    };
    config.notifications = NotificationConfig {
        enabled: true,
        fulfillment_address: Some("fulfillment@company.com".to_string()),
        ..NotificationConfig::default()
    };
    config
}

/// App on a fresh in-memory database, mock directory enabled
pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

/// Same as [`spawn_app`] with configuration overrides applied first
pub async fn spawn_app_with(configure: impl FnOnce(&mut Config)) -> TestApp {
    let mut config = test_config();
    configure(&mut config);
    let pool = db::create_pool(&config).await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    let directory = Arc::new(MockDirectory::with_sample_accounts(
        config.directory.bind_dn.clone(),
        config.directory.bind_password.clone(),
    ));
    let notifications = NotificationService::new(
        Arc::new(LogNotifier),
        config.notifications.clone(),
        &config.directory.domain,
    );

    let state = AppState::new(pool, &config, directory.clone(), notifications);
    state
        .user_service
        .ensure_fallback_admin(ADMIN_PASSWORD)
        .await
        .unwrap();

    TestApp {
        router: build_router(state.clone(), &config),
        state,
        directory,
    }
}

impl TestApp {
    /// Send a request with an optional JSON body and bearer token
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, token, None).await
    }

    /// Log in and return the access token
    pub async fn login(&self, username: &str, password: &str) -> String {
        let (status, body) = self
            .post(
                "/api/auth/login",
                None,
                serde_json::json!({ "username": username, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["access_token"].as_str().unwrap().to_string()
    }

    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_USERNAME, ADMIN_PASSWORD).await
    }

    /// Local account with a starting balance, created through the admin API
    pub async fn create_user(&self, admin: &str, username: &str, balance: i64) -> String {
        let password = format!("{}-password", username);
        let (status, body) = self
            .post(
                "/api/users",
                Some(admin),
                serde_json::json!({
                    "username": username,
                    "password": password,
                    "balance": balance,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create user failed: {}", body);
        self.login(username, &password).await
    }

    pub async fn create_item(&self, admin: &str, name: &str, price: i64, quantity: i64) {
        let (status, body) = self
            .post(
                "/api/items",
                Some(admin),
                serde_json::json!({
                    "name": name,
                    "description": format!("{} description", name),
                    "price": price,
                    "quantity": quantity,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create item failed: {}", body);
    }
}
