use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing device credential")]
    Missing,

    #[error("unknown device credential")]
    Unknown,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("request body is not a JSON object")]
    MalformedBody,

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("field {field} must be {expected}")]
    TypeMismatch {
        field: &'static str,
        expected: &'static str,
    },
}

/// Failure of one report cycle.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}
