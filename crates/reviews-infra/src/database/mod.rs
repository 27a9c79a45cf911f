//! Transactional stores - PostgreSQL and in-memory fallback.

mod connections;
mod memory;

#[cfg(feature = "postgres")]
pub mod entity;
#[cfg(feature = "postgres")]
mod postgres_store;

pub use connections::DatabaseConfig;
pub use memory::{InMemoryStore, InMemoryTransaction};

#[cfg(feature = "postgres")]
pub use connections::connect;
#[cfg(feature = "postgres")]
pub use postgres_store::{PostgresStore, PostgresTransaction};
