use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::any::Any;

use crate::errors::{ApiError, ErrorNormalizer, PendingFailure, RawFailure};

/// Terminal sink for request failures.
///
/// Any response carrying a [`PendingFailure`] is replaced by the normalized
/// rendering for the configured environment. Other responses pass through.
pub async fn normalize_errors(
    State(normalizer): State<ErrorNormalizer>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;

    match response.extensions_mut().remove::<PendingFailure>() {
        Some(pending) => normalizer.respond(&pending.failure, pending.prior_status),
        None => response,
    }
}

/// Convert a handler panic into an unknown failure for [`normalize_errors`]
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "handler panicked".to_string()
    };

    ApiError::new(RawFailure::unknown(message)).into_response()
}
