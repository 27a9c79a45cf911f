//! Unit-of-Work manager.
//!
//! Opens one transaction per request and resolves it exactly once:
//! commit when the enclosed work returns `Ok`, roll back on any `Err`,
//! on panic, on timeout, and when the session is dropped while open.
//!
//! # Example
//! ```ignore
//! let invoice = state
//!     .uow
//!     .run(|tx| Box::pin(async move {
//!         tx.create_invoice(Invoice::new(total)).await.map_err(AppError::from)
//!     }))
//!     .await?;
//! ```

use std::fmt::Display;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use uuid::Uuid;

use reviews_core::UnitOfWorkError;
use reviews_core::ports::{ResolutionAction, SessionState, Transaction, TransactionalStore};

/// Hands out sessions against a transactional store.
///
/// Cheap to clone; sessions on different requests never wait on each other
/// inside the manager.
#[derive(Clone)]
pub struct UnitOfWork {
    store: Arc<dyn TransactionalStore>,
    timeout: Option<Duration>,
}

impl UnitOfWork {
    pub fn new(store: Arc<dyn TransactionalStore>) -> Self {
        Self {
            store,
            timeout: None,
        }
    }

    /// Abort and roll back work that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Open a session. Fails with `Connectivity` when the store is unreachable.
    pub async fn begin(&self) -> Result<Session, UnitOfWorkError> {
        let tx = self.store.begin().await.map_err(|e| {
            tracing::error!(error = %e, failure = "connectivity", "Failed to begin unit of work");
            UnitOfWorkError::Connectivity(e.to_string())
        })?;

        let session = Session::new(tx);
        tracing::trace!(session = %session.id, "Unit of work opened");
        Ok(session)
    }

    /// Run `work` inside a fresh session and resolve it on every exit path.
    ///
    /// The result of `work` is returned unchanged when resolution succeeds.
    /// A failed commit or rollback is returned as `E::from(Resolution)`.
    /// A panic inside `work` rolls the session back and resumes unwinding.
    pub async fn run<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t dyn Transaction) -> BoxFuture<'t, Result<T, E>>,
        E: From<UnitOfWorkError> + Display,
    {
        let mut session = self.begin().await?;

        let outcome = {
            let tx = session.transaction()?;
            let guarded = AssertUnwindSafe(work(tx)).catch_unwind();
            match self.timeout {
                // Elapsing drops the future, aborting the in-flight store call.
                Some(limit) => tokio::time::timeout(limit, guarded).await.ok(),
                None => Some(guarded.await),
            }
        };

        match outcome {
            Some(Ok(result)) => {
                session.resolve(&result).await?;
                result
            }
            Some(Err(panic)) => {
                tracing::error!(session = %session.id, "Unit of work panicked, rolling back");
                // Resolution failures are already logged; the panic takes precedence.
                let _ = session.rollback().await;
                std::panic::resume_unwind(panic)
            }
            None => {
                let limit = self.timeout.unwrap_or_default();
                tracing::warn!(session = %session.id, timeout = ?limit, "Unit of work timed out, rolling back");
                session.rollback().await?;
                Err(UnitOfWorkError::TimedOut(limit).into())
            }
        }
    }
}

/// One open transaction and its resolution state.
pub struct Session {
    id: Uuid,
    tx: Option<Box<dyn Transaction>>,
    state: SessionState,
}

impl Session {
    fn new(tx: Box<dyn Transaction>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx: Some(tx),
            state: SessionState::Open,
        }
    }

    /// The open transaction. Fails once the session has been resolved.
    pub fn transaction(&self) -> Result<&dyn Transaction, UnitOfWorkError> {
        self.tx
            .as_deref()
            .ok_or(UnitOfWorkError::AlreadyResolved(self.state))
    }

    /// Commit if `outcome` is `Ok`, roll back otherwise.
    pub async fn resolve<T, E: Display>(
        &mut self,
        outcome: &Result<T, E>,
    ) -> Result<SessionState, UnitOfWorkError> {
        match outcome {
            Ok(_) => self.commit().await,
            Err(e) => {
                tracing::debug!(
                    session = %self.id,
                    error = %e,
                    failure = "handler",
                    "Work failed, rolling back unit of work"
                );
                self.rollback().await
            }
        }
    }

    pub async fn commit(&mut self) -> Result<SessionState, UnitOfWorkError> {
        self.finish(ResolutionAction::Commit).await
    }

    pub async fn rollback(&mut self) -> Result<SessionState, UnitOfWorkError> {
        self.finish(ResolutionAction::Rollback).await
    }

    async fn finish(&mut self, action: ResolutionAction) -> Result<SessionState, UnitOfWorkError> {
        let Some(tx) = self.tx.take() else {
            tracing::error!(
                session = %self.id,
                state = %self.state,
                attempted = %action,
                "Unit of work resolved more than once"
            );
            return Err(UnitOfWorkError::AlreadyResolved(self.state));
        };

        let (result, resolved) = match action {
            ResolutionAction::Commit => (tx.commit().await, SessionState::Committed),
            ResolutionAction::Rollback => (tx.rollback().await, SessionState::RolledBack),
        };

        match result {
            Ok(()) => {
                self.state = resolved;
                tracing::trace!(session = %self.id, state = %resolved, "Unit of work resolved");
                Ok(resolved)
            }
            Err(e) => {
                // The handle is gone either way; nothing from it became visible.
                self.state = SessionState::RolledBack;
                tracing::error!(
                    session = %self.id,
                    action = %action,
                    error = %e,
                    failure = "resolution",
                    "Unit of work resolution failed"
                );
                Err(UnitOfWorkError::Resolution {
                    action,
                    message: e.to_string(),
                })
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            tracing::warn!(session = %self.id, "Unit of work dropped while open, rolling back");
            drop(tx);
        }
    }
}
