use axum::Json;
use utoipa::OpenApi;

use crate::api::handlers::{HealthResponse, ReadyResponse};
use crate::errors::{ErrorBody, ErrorKind, Status};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "CRM Service",
        version = "0.1.0",
        description = "Lead and activity management backend. Every failure is returned as an ErrorBody whose detail depends on the deployment environment.",
    ),
    paths(
        crate::api::handlers::health,
        crate::api::handlers::health_ready,
    ),
    components(
        schemas(
            HealthResponse,
            ReadyResponse,
            ErrorBody,
            ErrorKind,
            Status,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
    )
)]
pub struct ApiDoc;

/// Serves the OpenAPI document as JSON
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
