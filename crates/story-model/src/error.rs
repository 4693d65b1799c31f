use thiserror::Error;

use crate::reindex::Key;

/// Errors raised by document operations.
///
/// `Validation` is user-facing and leaves the document untouched.
/// `Referential` means a caller used a key that does not resolve; with the
/// density invariants intact this is a programming defect and callers must
/// propagate it rather than recover.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("{0}")]
    Validation(String),
    #[error("{kind} {key} does not exist")]
    Referential { kind: &'static str, key: Key },
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ModelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ModelError::Validation(msg.into())
    }

    pub fn missing(kind: &'static str, key: Key) -> Self {
        ModelError::Referential { kind, key }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ModelError::Validation(_))
    }

    /// A key that does not resolve. Never shown to the user as a mistake.
    pub fn is_defect(&self) -> bool {
        matches!(self, ModelError::Referential { .. })
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
