//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic value failures only (malformed identifiers, labels, amounts).
/// Storage concerns belong to the backend error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. negative amount, bad config value).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A label value could not be interpreted (e.g. non-numeric bound).
    #[error("malformed label '{key}': {reason}")]
    MalformedLabel { key: String, reason: String },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn malformed_label(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedLabel {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
