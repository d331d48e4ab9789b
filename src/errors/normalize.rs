//! Classification of raw failures into the single error shape the HTTP
//! layer understands.
//!
//! [`normalize`] is pure and total: it never panics and every input yields
//! exactly one [`NormalizedError`]. Disclosure (what the caller gets to see)
//! is decided separately by [`super::ErrorNormalizer`].

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::codes::ErrorKind;
use super::failure::{DataAccessFailure, RawFailure, TokenFailure};

pub const INVALID_TOKEN_MESSAGE: &str = "Invalid token. Please log in again.";
pub const EXPIRED_TOKEN_MESSAGE: &str = "Your token has expired! Please log in again.";
pub const AUTHENTICATION_FAILED_MESSAGE: &str = "Authentication failed. Please log in again.";
pub const RESOURCE_NOT_FOUND_MESSAGE: &str = "Resource not found.";
pub const INVALID_REQUEST_MESSAGE: &str = "Invalid request.";

const FALLBACK_STATUS: u16 = 500;
const UNKNOWN_CONFLICT_FIELDS: &str = "one or more fields";

/// Coarse outcome reported in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Client-side failure (4xx)
    Fail,
    /// Server-side failure (anything else)
    Error,
}

impl Status {
    pub fn for_code(status_code: u16) -> Self {
        if (400..500).contains(&status_code) {
            Self::Fail
        } else {
            Self::Error
        }
    }
}

/// Canonical error produced for one failing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedError {
    pub status_code: u16,
    pub status: Status,
    pub message: String,
    pub is_operational: bool,
    pub kind: ErrorKind,
}

impl NormalizedError {
    fn remap(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.status_code = kind.status_code();
        self.status = Status::for_code(self.status_code);
        self.message = message.into();
        self.is_operational = true;
        self.kind = kind;
    }

    /// Resolved code as an HTTP status
    pub fn http_status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Classify `failure`.
///
/// `prior_status` is the status already set on the response when the
/// failure surfaced; only error statuses (4xx/5xx) are taken into account.
pub fn normalize(failure: &RawFailure, prior_status: Option<StatusCode>) -> NormalizedError {
    let status_code = failure
        .explicit_status()
        .filter(|code| is_valid_status(*code))
        .or_else(|| {
            prior_status
                .filter(|status| status.is_client_error() || status.is_server_error())
                .map(|status| status.as_u16())
        })
        .unwrap_or(FALLBACK_STATUS);

    let mut normalized = NormalizedError {
        status_code,
        status: Status::for_code(status_code),
        message: failure.to_string(),
        is_operational: failure.operational_flag().unwrap_or(false),
        kind: failure.kind(),
    };

    match failure {
        RawFailure::Token(token) => {
            let message = match token {
                TokenFailure::InvalidSignature => INVALID_TOKEN_MESSAGE,
                TokenFailure::Expired => EXPIRED_TOKEN_MESSAGE,
                TokenFailure::Other(_) => AUTHENTICATION_FAILED_MESSAGE,
            };
            normalized.remap(ErrorKind::Authentication, message);
        }
        RawFailure::DataAccess(DataAccessFailure::Conflict { fields }) => {
            normalized.remap(ErrorKind::Conflict, duplicate_field_message(fields.as_deref()));
        }
        RawFailure::DataAccess(DataAccessFailure::NotFound) => {
            normalized.remap(ErrorKind::NotFound, RESOURCE_NOT_FOUND_MESSAGE);
        }
        RawFailure::DataAccess(DataAccessFailure::Other { diagnostic }) => {
            let message = last_line(diagnostic).unwrap_or(INVALID_REQUEST_MESSAGE);
            normalized.remap(ErrorKind::Validation, message);
        }
        RawFailure::Operational { .. } | RawFailure::Validation { .. } | RawFailure::Unknown { .. } => {}
    }

    normalized
}

pub fn duplicate_field_message(fields: Option<&[String]>) -> String {
    let fields = fields
        .filter(|fields| !fields.is_empty())
        .map(|fields| fields.join(", "))
        .unwrap_or_else(|| UNKNOWN_CONFLICT_FIELDS.to_string());
    format!("Duplicate field value: {fields}. Please use another value.")
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rev().find(|line| !line.is_empty())
}

fn is_valid_status(code: u16) -> bool {
    (100..=599).contains(&code)
}
