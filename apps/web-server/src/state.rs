//! Application state - shared across all handlers.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use reviews_core::ports::{Transaction, TransactionalStore};
use reviews_infra::{InMemoryStore, UnitOfWork};

use crate::config::AppConfig;
use crate::middleware::error::AppResult;

#[cfg(feature = "postgres")]
use reviews_infra::{PostgresStore, connect};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub uow: UnitOfWork,
    pub healthcheck_delay: Duration,
}

impl AppState {
    /// Build the application state, falling back to the in-memory store when
    /// no database is configured or reachable.
    pub async fn new(config: &AppConfig) -> Self {
        let store = build_store(config).await;
        let uow = UnitOfWork::new(store).with_timeout(config.unit_of_work_timeout);

        tracing::info!("Application state initialized");

        Self {
            uow,
            healthcheck_delay: config.healthcheck_delay,
        }
    }

    /// State over an empty in-memory store.
    pub fn in_memory() -> Self {
        Self {
            uow: UnitOfWork::new(Arc::new(InMemoryStore::new())),
            healthcheck_delay: Duration::ZERO,
        }
    }

    /// Run `work` in one unit of work: committed on `Ok`, rolled back otherwise.
    pub async fn transaction<T, F>(&self, work: F) -> AppResult<T>
    where
        F: for<'t> FnOnce(&'t dyn Transaction) -> BoxFuture<'t, AppResult<T>>,
    {
        self.uow.run(work).await
    }
}

#[cfg(feature = "postgres")]
async fn build_store(config: &AppConfig) -> Arc<dyn TransactionalStore> {
    let Some(db_config) = config.database.as_ref() else {
        tracing::warn!("DATABASE_URL not set. Running without database (in-memory mode).");
        return Arc::new(InMemoryStore::new());
    };

    match connect(db_config).await {
        Ok(db) => Arc::new(PostgresStore::new(db)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database. Using in-memory fallback.");
            Arc::new(InMemoryStore::new())
        }
    }
}

#[cfg(not(feature = "postgres"))]
async fn build_store(_config: &AppConfig) -> Arc<dyn TransactionalStore> {
    tracing::info!("Running without postgres feature - using in-memory store");
    Arc::new(InMemoryStore::new())
}
