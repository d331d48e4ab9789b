use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crm_service::api::handlers::AppStateInner;
use crm_service::api::routes::create_router;
use crm_service::config::Config;
use crm_service::errors::ErrorNormalizer;
use crm_service::metrics;
use crm_service::notifications::NotificationStore;

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Starting graceful shutdown...");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,crm_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting CRM service v{}", env!("CARGO_PKG_VERSION"));

    // Initialize metrics
    metrics::registry::init_metrics();
    info!("Metrics registry initialized");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(environment = %config.environment, "Configuration loaded successfully");

    // Database pool connects on first use so the service can start (and
    // report unready) while the database is still coming up.
    let db = match &config.database {
        Some(database) => {
            let pool = PgPoolOptions::new()
                .max_connections(database.max_connections)
                .acquire_timeout(Duration::from_millis(database.acquire_timeout_ms))
                .connect_lazy(&database.url)
                .context("Invalid DATABASE_URL")?;
            info!("Database pool configured");
            Some(pool)
        }
        None => {
            info!("DATABASE_URL not set, readiness probe will skip the database");
            None
        }
    };

    let notifications = NotificationStore::new(config.notifications.clone())
        .context("Failed to create notification store")?;
    info!(
        limit = notifications.config().limit,
        default_duration_ms = notifications.config().default_duration.as_millis() as u64,
        "Notification store ready"
    );

    let state = Arc::new(AppStateInner {
        normalizer: ErrorNormalizer::new(config.environment),
        db,
        notifications,
    });

    // Create router
    let app = create_router(state);

    // Start server
    let addr = config.server_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind server")?;

    info!("Server listening on {}", addr);

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");

    Ok(())
}
