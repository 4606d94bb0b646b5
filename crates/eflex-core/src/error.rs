//! Unified error types for the eflex workspace.
//!
//! Domain-specific errors (store preconditions, solver failures, worker
//! configuration) convert into [`EflexError`] for uniform handling at API
//! boundaries. Constraint violations found by the feasibility checker are
//! deliberately *not* errors; they are recorded as iteration data.

use thiserror::Error;

use crate::store::StoreError;

/// Unified error type for all eflex operations.
#[derive(Error, Debug)]
pub enum EflexError {
    /// I/O errors (file access, sockets).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Iteration-store precondition failures.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Problem-description validation errors.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Solver/backend errors.
    #[error("Solver error: {0}")]
    Solver(String),

    /// Missing or inconsistent deployment configuration; fatal to a worker
    /// during setup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Coordination-protocol errors (handshake, transport).
    #[error("Coordination error: {0}")]
    Coordination(String),

    /// Generic errors (for wrapping external errors).
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using EflexError.
pub type EflexResult<T> = Result<T, EflexError>;

impl From<anyhow::Error> for EflexError {
    fn from(err: anyhow::Error) -> Self {
        EflexError::Other(err.to_string())
    }
}

impl From<String> for EflexError {
    fn from(s: String) -> Self {
        EflexError::Other(s)
    }
}

impl From<&str> for EflexError {
    fn from(s: &str) -> Self {
        EflexError::Other(s.to_string())
    }
}
