pub mod middleware;
pub mod registry;

use axum::{
    http::header,
    response::{IntoResponse, Response},
};
use prometheus::{Encoder, TextEncoder};

use crate::errors::{ApiError, RawFailure};

/// Prometheus text exposition of the service registry.
///
/// Encoding failures go through the error pipeline like any other failure.
pub async fn metrics_handler() -> Result<Response, ApiError> {
    registry::init_metrics();

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| RawFailure::unknown(format!("failed to encode metrics: {e}")))?;
    let body = String::from_utf8(buffer)
        .map_err(|e| RawFailure::unknown(format!("metrics are not valid UTF-8: {e}")))?;

    Ok(([(header::CONTENT_TYPE, encoder.format_type())], body).into_response())
}

pub use registry::{ERRORS_TOTAL, HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS, REGISTRY};

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_expose_service_registry() {
        ERRORS_TOTAL.with_label_values(&["409", "true"]).inc();

        let response = metrics_handler().await.unwrap();
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/plain"));

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("# TYPE errors_total counter"));
        assert!(text.contains("status=\"409\""));
    }
}
