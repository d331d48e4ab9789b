use axum::{middleware, routing::get, Router};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{health, health_ready, route_not_found, AppState};
use super::middleware::{handle_panic, logging_middleware, normalize_errors};
use super::openapi::openapi_json;
use crate::errors::ErrorNormalizer;
use crate::metrics;

pub fn create_router(state: AppState) -> Router {
    let normalizer = state.normalizer;

    let routes = Router::new()
        // Health check
        .route("/health", get(health))
        .route("/health/ready", get(health_ready))
        // Metrics endpoint (Prometheus)
        .route("/metrics", get(metrics::metrics_handler))
        // OpenAPI documentation
        .route("/api-docs/openapi.json", get(openapi_json))
        .fallback(route_not_found)
        .with_state(state);

    with_error_handling(routes, normalizer)
}

/// Wrap `router` in the service middleware stack.
///
/// Order, innermost first: panic capture -> error normalization -> logging
/// -> metrics -> cors -> trace. Panics and handler failures therefore reach
/// the normalizer, and logging/metrics see the final status.
pub fn with_error_handling(router: Router, normalizer: ErrorNormalizer) -> Router {
    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn_with_state(normalizer, normalize_errors))
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn(metrics::middleware::track_metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
