//! Domain-level error types.

use std::time::Duration;

use thiserror::Error;

use crate::ports::{ResolutionAction, SessionState};

/// Domain errors - business rule violations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Repository-level errors.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Database connection failed: {0}")]
    Connection(String),

    #[error("Query execution failed: {0}")]
    Query(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

/// Failures of the transactional lifecycle itself, as opposed to failures
/// of the work performed inside it.
#[derive(Debug, Error)]
pub enum UnitOfWorkError {
    /// The store could not open a transaction. Not retried.
    #[error("Store unreachable: {0}")]
    Connectivity(String),

    /// Commit or rollback itself failed.
    #[error("Failed to {action} unit of work: {message}")]
    Resolution {
        action: ResolutionAction,
        message: String,
    },

    /// Resolution was requested on a session that is no longer open.
    #[error("Unit of work already resolved ({0})")]
    AlreadyResolved(SessionState),

    /// The enclosed work did not finish before the deadline and was aborted.
    #[error("Unit of work timed out after {0:?}")]
    TimedOut(Duration),
}

impl UnitOfWorkError {
    /// True when the failure happened while committing or rolling back.
    pub fn is_resolution(&self) -> bool {
        matches!(self, Self::Resolution { .. })
    }
}
