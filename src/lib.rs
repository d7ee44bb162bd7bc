//! NESOP Store backend library
//!
//! Internal company store: local and directory sign-in, a catalog of items,
//! orders paid from an internal currency balance, and the admin surface for
//! users, inventory and currency.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod housekeeping;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod routes;
pub mod services;
pub mod state;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, Method},
    middleware::{from_fn, Next},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};

use crate::config::Config;
use crate::state::AppState;

/// Full application router with middleware applied
pub fn build_router(state: AppState, config: &Config) -> Router {
    let rate_limiter = state.rate_limiter.clone();

    let mut app = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .merge(routes::auth_routes())
        .merge(routes::item_routes(config.max_file_size))
        .merge(routes::order_routes())
        .merge(routes::user_routes())
        .merge(routes::currency_routes())
        .merge(routes::admin_routes())
        .with_state(state)
        .nest_service("/assets/images", ServeDir::new(&config.upload_folder))
        // Outermost first
        .layer(
            ServiceBuilder::new()
                .layer(configure_cors(config.cors_allowed_origins.as_deref()))
                .layer(from_fn(move |req: Request, next: Next| {
                    let limiter = rate_limiter.clone();
                    middleware::rate_limit_layer(limiter)(req, next)
                }))
                .layer(from_fn(middleware::request_tracing))
                .layer(from_fn(middleware::security_headers)),
        );

    if config.environment.is_production() {
        app = app.layer(from_fn(middleware::hsts_header));
    }

    app
}

async fn root() -> &'static str {
    "NESOP Store API Server"
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    database: String,
    version: String,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_status = match db::check_health(&state.db_pool).await {
        Ok(()) => "connected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    let status = if db_status == "connected" {
        "healthy"
    } else {
        "unhealthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        database: db_status,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn configure_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let allowed_origins = allowed_origins.unwrap_or_default();

    if allowed_origins.trim().is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}
