use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Failure taxonomy shared by every layer of the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Input validation failed
    Validation,

    /// Invalid or expired credentials
    Authentication,

    /// Write rejected by a uniqueness constraint
    Conflict,

    /// Requested resource does not exist
    NotFound,

    /// Unclassified failure or programming defect
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "VALIDATION"),
            Self::Authentication => write!(f, "AUTHENTICATION"),
            Self::Conflict => write!(f, "CONFLICT"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorKind {
    /// Canonical HTTP status code for this kind
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Authentication => 401,
            Self::Conflict => 400,
            Self::NotFound => 404,
            Self::Unknown => 500,
        }
    }
}
