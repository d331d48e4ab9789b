use axum::{
    extract::State,
    http::Uri,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use utoipa::ToSchema;

use crate::config::Environment;
use crate::errors::{ApiError, ErrorBody, ErrorNormalizer, RawFailure};
use crate::notifications::NotificationStore;

lazy_static::lazy_static! {
    static ref START_TIME: Instant = Instant::now();
}

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub normalizer: ErrorNormalizer,
    /// Absent when no `DATABASE_URL` is configured
    pub db: Option<PgPool>,
    pub notifications: NotificationStore,
}

impl AppStateInner {
    pub fn environment(&self) -> Environment {
        self.normalizer.environment()
    }
}

/// Liveness response
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Always "healthy" when the process answers
    pub status: String,
    pub service: String,
    pub version: String,
    /// "development" or "production"
    pub environment: String,
    pub uptime_seconds: u64,
    /// Notifications currently held by the store
    pub active_notifications: usize,
}

/// Readiness response
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Always "ready" on success
    pub status: String,
    /// Whether a database round-trip was part of the check
    pub database_checked: bool,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "crm-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.environment().to_string(),
        uptime_seconds: START_TIME.elapsed().as_secs(),
        active_notifications: state.notifications.len(),
    })
}

/// Readiness probe; round-trips to the database when one is configured
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service can take traffic", body = ReadyResponse),
        (status = 500, description = "A dependency is unavailable", body = ErrorBody)
    )
)]
pub async fn health_ready(State(state): State<AppState>) -> Result<Json<ReadyResponse>, ApiError> {
    if let Some(pool) = &state.db {
        sqlx::query("SELECT 1").execute(pool).await?;
        debug!("Database readiness check passed");
    }

    Ok(Json(ReadyResponse {
        status: "ready".to_string(),
        database_checked: state.db.is_some(),
    }))
}

/// Fallback for every unmatched route
pub async fn route_not_found(uri: Uri) -> ApiError {
    ApiError::new(RawFailure::operational(
        404,
        format!("Can't find {} on this server!", uri.path()),
    ))
}
