//! Failure taxonomy, normalization and environment-aware disclosure

pub mod codes;
pub mod failure;
pub mod normalize;
pub mod response;

pub use codes::ErrorKind;
pub use failure::{DataAccessFailure, RawFailure, TokenFailure};
pub use normalize::{normalize, NormalizedError, Status};
pub use response::{ApiError, ErrorBody, ErrorNormalizer, PendingFailure};
