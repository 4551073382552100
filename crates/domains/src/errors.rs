//! # DomainError
//!
//! Centralized error handling for the moderation engine.
//! Every failure a caller can observe maps onto one of these variants.

use thiserror::Error;

/// The primary error type for all moderation operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Target entity absent in the given board scope
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed or missing required field; no I/O was performed
    #[error("validation error: {0}")]
    Validation(String),

    /// Tag name collision within a board
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// The external authorizer denied the actor
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Store, cache, or transaction failure. The detail is for logs only.
    #[error("internal service error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    /// Text that is safe to hand back to the caller.
    /// Internal failures collapse to a fixed message.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

/// A specialized Result type for moderation logic.
pub type Result<T> = std::result::Result<T, DomainError>;
