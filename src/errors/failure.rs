use axum::extract::rejection::JsonRejection;
use serde_json::{json, Value};
use sqlx::error::DatabaseError;
use sqlx::postgres::PgDatabaseError;
use thiserror::Error;

use super::codes::ErrorKind;

/// A failure raised anywhere while handling a request.
///
/// Every variant carries only what its kind needs. Lower-layer errors
/// (`sqlx`, `jsonwebtoken`, body extraction, `anyhow`) convert into this type
/// so handlers can use `?` and leave classification to the normalizer.
#[derive(Debug, Clone, Error)]
pub enum RawFailure {
    /// Raised deliberately by a handler with a known HTTP status
    #[error("{message}")]
    Operational { status_code: u16, message: String },

    /// Request input rejected before reaching the data layer
    #[error("{message}")]
    Validation { message: String },

    #[error(transparent)]
    Token(#[from] TokenFailure),

    #[error(transparent)]
    DataAccess(#[from] DataAccessFailure),

    /// Anything unclassified: defects, panics, infrastructure faults
    #[error("{message}")]
    Unknown {
        message: String,
        trace: Option<String>,
    },
}

/// Authentication token verification failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenFailure {
    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("{0}")]
    Other(String),
}

/// Failures reported by the persistence layer for a well-formed query
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataAccessFailure {
    /// Write rejected by a uniqueness constraint
    #[error("unique constraint violated")]
    Conflict { fields: Option<Vec<String>> },

    /// Update or delete target does not exist
    #[error("record to update or delete does not exist")]
    NotFound,

    #[error("{diagnostic}")]
    Other { diagnostic: String },
}

impl RawFailure {
    pub fn operational(status_code: u16, message: impl Into<String>) -> Self {
        Self::Operational {
            status_code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
            trace: None,
        }
    }

    /// Kind discriminator, stable across releases
    pub fn name(&self) -> &'static str {
        match self {
            Self::Operational { .. } => "operational",
            Self::Validation { .. } => "validation",
            Self::Token(TokenFailure::InvalidSignature) => "token-invalid",
            Self::Token(TokenFailure::Expired) => "token-expired",
            Self::Token(TokenFailure::Other(_)) => "token",
            Self::DataAccess(DataAccessFailure::Conflict { .. }) => "data-access-conflict",
            Self::DataAccess(DataAccessFailure::NotFound) => "data-access-not-found",
            Self::DataAccess(DataAccessFailure::Other { .. }) => "data-access",
            Self::Unknown { .. } => "unknown",
        }
    }

    /// Position of this failure in the service-wide taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Operational { status_code, .. } => match status_code {
                401 | 403 => ErrorKind::Authentication,
                404 => ErrorKind::NotFound,
                409 => ErrorKind::Conflict,
                400..=499 => ErrorKind::Validation,
                _ => ErrorKind::Unknown,
            },
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Token(_) => ErrorKind::Authentication,
            Self::DataAccess(DataAccessFailure::Conflict { .. }) => ErrorKind::Conflict,
            Self::DataAccess(DataAccessFailure::NotFound) => ErrorKind::NotFound,
            Self::DataAccess(DataAccessFailure::Other { .. }) => ErrorKind::Validation,
            Self::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    /// Status code the raiser attached, if any
    pub fn explicit_status(&self) -> Option<u16> {
        match self {
            Self::Operational { status_code, .. } => Some(*status_code),
            Self::Validation { .. } => Some(ErrorKind::Validation.status_code()),
            Self::Token(_) | Self::DataAccess(_) | Self::Unknown { .. } => None,
        }
    }

    /// Operational flag the raiser attached, if any
    pub fn operational_flag(&self) -> Option<bool> {
        match self {
            Self::Operational { .. } | Self::Validation { .. } => Some(true),
            Self::Token(_) | Self::DataAccess(_) | Self::Unknown { .. } => None,
        }
    }

    /// Captured trace text, or the debug rendering when none was captured
    pub fn trace(&self) -> String {
        match self {
            Self::Unknown {
                trace: Some(trace), ..
            } => trace.clone(),
            _ => format!("{self:?}"),
        }
    }

    /// Full structured rendering, for development responses and logs only
    pub fn to_json(&self) -> Value {
        let mut value = json!({
            "name": self.name(),
            "message": self.to_string(),
        });
        let extra = match self {
            Self::Operational { status_code, .. } => json!({ "statusCode": status_code }),
            Self::DataAccess(DataAccessFailure::Conflict { fields }) => json!({ "fields": fields }),
            Self::DataAccess(DataAccessFailure::Other { diagnostic }) => {
                json!({ "diagnostic": diagnostic })
            }
            _ => Value::Null,
        };
        if let (Value::Object(target), Value::Object(extra)) = (&mut value, extra) {
            target.extend(extra);
        }
        value
    }
}

impl From<sqlx::Error> for RawFailure {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DataAccessFailure::NotFound.into(),
            sqlx::Error::Database(db) if db.is_unique_violation() => DataAccessFailure::Conflict {
                fields: conflict_fields(db.as_ref()),
            }
            .into(),
            sqlx::Error::Database(db) => DataAccessFailure::Other {
                diagnostic: db.message().to_string(),
            }
            .into(),
            other => Self::Unknown {
                message: other.to_string(),
                trace: Some(format!("{other:?}")),
            },
        }
    }
}

impl From<jsonwebtoken::errors::Error> for RawFailure {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind as JwtErrorKind;

        let failure = match err.kind() {
            JwtErrorKind::InvalidSignature => TokenFailure::InvalidSignature,
            JwtErrorKind::ExpiredSignature => TokenFailure::Expired,
            _ => TokenFailure::Other(err.to_string()),
        };
        failure.into()
    }
}

impl From<JsonRejection> for RawFailure {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<anyhow::Error> for RawFailure {
    fn from(err: anyhow::Error) -> Self {
        Self::Unknown {
            message: err.to_string(),
            trace: Some(format!("{err:?}")),
        }
    }
}

fn conflict_fields(db: &dyn DatabaseError) -> Option<Vec<String>> {
    db.try_downcast_ref::<PgDatabaseError>()
        .and_then(|pg| pg.detail())
        .and_then(parse_key_detail)
        .or_else(|| parse_unique_message(db.message()))
}

/// Postgres: `Key (email, phone)=(a@b.c, 555) already exists.`
fn parse_key_detail(detail: &str) -> Option<Vec<String>> {
    let start = detail.find("Key (")? + "Key (".len();
    let end = start + detail[start..].find(")=")?;
    split_fields(&detail[start..end])
}

/// SQLite: `UNIQUE constraint failed: leads.email, leads.phone`
fn parse_unique_message(message: &str) -> Option<Vec<String>> {
    let (_, columns) = message.split_once("constraint failed:")?;
    let fields: Vec<String> = columns
        .split(',')
        .map(|column| column.trim().rsplit('.').next().unwrap_or_default().to_string())
        .filter(|field| !field.is_empty())
        .collect();
    (!fields.is_empty()).then_some(fields)
}

fn split_fields(list: &str) -> Option<Vec<String>> {
    let fields: Vec<String> = list
        .split(',')
        .map(|field| field.trim().trim_matches('"').to_string())
        .filter(|field| !field.is_empty())
        .collect();
    (!fields.is_empty()).then_some(fields)
}
