//! Domain error types
//!
//! Errors raised while constructing or parsing domain values. Engine
//! failures are not domain errors; see [`crate::ports::EngineError`].

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid folder identifier
    #[error("Invalid folder ID: {0}")]
    InvalidFolderId(String),

    /// Invalid device identifier
    #[error("Invalid device ID: {0}")]
    InvalidDeviceId(String),
}
