use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};
use utoipa::ToSchema;

use super::failure::RawFailure;
use super::normalize::{normalize, NormalizedError, Status};
use crate::config::Environment;
use crate::metrics::ERRORS_TOTAL;

pub const GENERIC_ERROR_MESSAGE: &str = "Something went very wrong! Please try again later.";

/// JSON body of every error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// "fail" for client errors, "error" otherwise
    pub status: Status,
    /// Safe, human-readable message
    pub message: String,
    /// Structured original failure (development only)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub error: Option<Value>,
    /// Trace text of the original failure (development only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorBody {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error: None,
            stack: None,
        }
    }

    /// Fixed body for non-operational failures in production
    pub fn generic() -> Self {
        Self::new(Status::Error, GENERIC_ERROR_MESSAGE)
    }
}

/// Turns raw failures into HTTP responses according to the running
/// environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorNormalizer {
    environment: Environment,
}

impl ErrorNormalizer {
    pub fn new(environment: Environment) -> Self {
        Self { environment }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn normalize(&self, failure: &RawFailure, prior_status: Option<StatusCode>) -> NormalizedError {
        normalize(failure, prior_status)
    }

    /// Decide what the caller sees for an already normalized failure
    pub fn disclose(&self, failure: &RawFailure, normalized: &NormalizedError) -> (StatusCode, ErrorBody) {
        match self.environment {
            Environment::Development => {
                let body = ErrorBody {
                    status: normalized.status,
                    message: normalized.message.clone(),
                    error: Some(failure.to_json()),
                    stack: Some(failure.trace()),
                };
                (normalized.http_status(), body)
            }
            Environment::Production if normalized.is_operational => (
                normalized.http_status(),
                ErrorBody::new(normalized.status, normalized.message.clone()),
            ),
            Environment::Production => (StatusCode::INTERNAL_SERVER_ERROR, ErrorBody::generic()),
        }
    }

    /// Classify, record and render one failure. Never fails.
    pub fn respond(&self, failure: &RawFailure, prior_status: Option<StatusCode>) -> Response {
        let normalized = self.normalize(failure, prior_status);

        if normalized.is_operational {
            debug!(
                failure_kind = failure.name(),
                status = normalized.status_code,
                message = %normalized.message,
                "Operational failure"
            );
        } else {
            error!(
                failure_kind = failure.name(),
                status = normalized.status_code,
                environment = %self.environment,
                error = %failure,
                trace = %failure.trace(),
                "Unhandled failure"
            );
        }

        ERRORS_TOTAL
            .with_label_values(&[
                &normalized.status_code.to_string(),
                if normalized.is_operational { "true" } else { "false" },
            ])
            .inc();

        let (status, body) = self.disclose(failure, &normalized);
        (status, Json(body)).into_response()
    }

    /// Same rendering as [`Self::respond`] without logging or metrics
    pub fn render(&self, failure: &RawFailure, prior_status: Option<StatusCode>) -> Response {
        let normalized = self.normalize(failure, prior_status);
        let (status, body) = self.disclose(failure, &normalized);
        (status, Json(body)).into_response()
    }
}

/// Failure waiting in the response extensions for the normalizing middleware
#[derive(Debug, Clone)]
pub struct PendingFailure {
    pub failure: RawFailure,
    pub prior_status: Option<StatusCode>,
}

/// Error type returned by request handlers.
///
/// Rendering is deferred: `into_response` stashes the failure as a
/// [`PendingFailure`] and the error-normalizing middleware replaces the
/// response. Without that middleware the caller still gets the safe
/// production rendering.
#[derive(Debug)]
pub struct ApiError {
    failure: RawFailure,
    prior_status: Option<StatusCode>,
}

impl ApiError {
    pub fn new(failure: RawFailure) -> Self {
        Self {
            failure,
            prior_status: None,
        }
    }

    /// Record a status the handler had already committed to
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.prior_status = Some(status);
        self
    }

    pub fn failure(&self) -> &RawFailure {
        &self.failure
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = ErrorNormalizer::new(Environment::Production)
            .render(&self.failure, self.prior_status);
        response.extensions_mut().insert(PendingFailure {
            failure: self.failure,
            prior_status: self.prior_status,
        });
        response
    }
}

impl From<RawFailure> for ApiError {
    fn from(failure: RawFailure) -> Self {
        Self::new(failure)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::new(err.into())
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::new(err.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.into())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(err.into())
    }
}
