//! NESOP Store backend server
//!
//! Serves the store API: sign-in against local accounts or the company
//! directory, the item catalog, orders paid in internal currency, and
//! admin management of users, inventory and balances.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;

use nesop_store::auth::{DirectoryClient, MockDirectory, OfflineDirectory};
use nesop_store::config::Config;
use nesop_store::notify::NotificationService;
use nesop_store::services::UserService;
use nesop_store::state::AppState;
use nesop_store::{build_router, db, housekeeping};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    for warning in config.validation_warnings() {
        tracing::warn!("{}", warning);
    }

    let db_pool = db::create_pool(&config).await?;
    db::run_migrations(&db_pool).await?;

    let users = UserService::new(
        db_pool.clone(),
        config.password_hash_cost,
        config.local_admin_username.clone(),
    );
    if users
        .ensure_fallback_admin(&config.local_admin_password)
        .await?
    {
        tracing::info!(username = %config.local_admin_username, "Created local admin account");
    }

    let directory_client: Arc<dyn DirectoryClient> = if config.directory.use_mock {
        tracing::info!("Using mock directory");
        Arc::new(MockDirectory::with_sample_accounts(
            config.directory.bind_dn.clone(),
            config.directory.bind_password.clone(),
        ))
    } else {
        Arc::new(OfflineDirectory::new(config.directory.server_url.clone()))
    };

    let notifications =
        NotificationService::from_config(&config.notifications, &config.directory.domain)?;

    let app_state = AppState::new(db_pool, &config, directory_client, notifications);

    // Keep the scheduler alive for the life of the server
    let _scheduler = match housekeeping::start(&app_state).await {
        Ok(scheduler) => Some(scheduler),
        Err(e) => {
            tracing::error!(error = %e, "Failed to start housekeeping scheduler");
            None
        }
    };

    let app = build_router(app_state, &config);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    // Peer addresses key the rate limiter when no proxy header is present
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
