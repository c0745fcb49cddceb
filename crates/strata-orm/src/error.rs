//! Error types for entity operations.

use thiserror::Error;

/// Errors raised by entity save, delete and query-scope operations.
///
/// A save with nothing to persist is not an error: it is reported as
/// `Ok(false)` so callers can tell it apart from a rejected payload.
#[derive(Debug, Error)]
pub enum EntityError {
    /// Configured input validation rejected the save payload.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The operation is not available for this entity's backing source.
    #[error("Unsupported operation on {model}: {reason}")]
    Unsupported { model: String, reason: String },

    /// Failure reported by the persistence collaborator, forwarded as-is.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Structured rejection produced by a [`crate::Validator`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", .errors.join("; "))]
pub struct ValidationError {
    /// Individual error messages from the validator.
    pub errors: Vec<String>,
}

impl ValidationError {
    #[must_use]
    pub fn new(errors: Vec<String>) -> Self {
        Self { errors }
    }

    #[must_use]
    pub fn single(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
        }
    }
}

/// Errors from the persistence collaborator.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// A query failed to execute.
    #[error("Query failed: {0}")]
    Query(String),

    /// The backing store refused the write (constraint, missing row, ...).
    #[error("Write rejected: {0}")]
    Rejected(String),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
