//! Error taxonomy shared by the store, the cache and the interaction layer.
//!
//! - `NotFound`: the id is absent. Terminal, never retried.
//! - `Validation`: malformed input (the client-error class). Terminal, shown verbatim.
//! - `Transient`: network or server-side failure. Retried, then surfaced.
//! - `Storage`: the durable write failed. Surfaced as a hard failure.

use thiserror::Error;

use super::{TaskId, ValidationError};

/// Retry classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// May succeed if attempted again.
    Transient,
    /// Retrying cannot help (missing record, rejected input).
    Permanent,
    /// The persistence medium itself failed.
    Infrastructure,
}

/// User-facing classification used to pick a notice message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Network,
    NotFound,
    InvalidData,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("invalid task data: {0}")]
    Validation(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient(_) => ErrorKind::Transient,
            Self::NotFound(_) | Self::Validation(_) => ErrorKind::Permanent,
            Self::Storage(_) => ErrorKind::Infrastructure,
        }
    }

    /// Only transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub fn class(&self) -> FailureClass {
        match self {
            Self::Transient(_) => FailureClass::Network,
            Self::NotFound(_) => FailureClass::NotFound,
            Self::Validation(_) => FailureClass::InvalidData,
            Self::Storage(_) => FailureClass::Other,
        }
    }
}

impl From<ValidationError> for StoreError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}
