//! Transactional storage port.
//!
//! The store is opaque beyond three operations: begin a transaction, commit
//! it, roll it back. Everything a handler reads or writes goes through the
//! repository traits on the open [`Transaction`].

use std::fmt;

use async_trait::async_trait;

use super::{InvoiceRepository, ReviewRepository};
use crate::error::RepoError;

/// Opens transactions against the backing store.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    /// Begin a new transaction. Any error here means the store is unreachable.
    async fn begin(&self) -> Result<Box<dyn Transaction>, RepoError>;
}

/// An open transaction.
///
/// Operations issued through one transaction execute in the order they were
/// issued. Dropping a transaction without calling [`commit`] or
/// [`rollback`] must roll it back.
///
/// [`commit`]: Transaction::commit
/// [`rollback`]: Transaction::rollback
#[async_trait]
pub trait Transaction: InvoiceRepository + ReviewRepository + Send + Sync {
    async fn commit(self: Box<Self>) -> Result<(), RepoError>;

    async fn rollback(self: Box<Self>) -> Result<(), RepoError>;
}

/// Lifecycle of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Committed,
    RolledBack,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Open => write!(f, "open"),
            SessionState::Committed => write!(f, "committed"),
            SessionState::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// The resolution step that was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionAction {
    Commit,
    Rollback,
}

impl fmt::Display for ResolutionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionAction::Commit => write!(f, "commit"),
            ResolutionAction::Rollback => write!(f, "roll back"),
        }
    }
}
