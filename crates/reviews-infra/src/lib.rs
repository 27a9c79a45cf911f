//! # Reviews Infrastructure
//!
//! Concrete implementations of the ports defined in `reviews-core`:
//! transactional stores, the unit-of-work manager, rate limiters and
//! notifiers.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external dependencies, in-memory only
//! - `postgres` - PostgreSQL store via SeaORM
//! - `redis` - Redis-backed rate limiting shared across instances

pub mod database;
pub mod notify;
pub mod rate_limit;
pub mod unit_of_work;

// Re-exports - In-Memory
pub use database::{DatabaseConfig, InMemoryStore};
pub use notify::{ConsoleNotifier, WebhookNotifier};
pub use rate_limit::{InMemoryRateLimiter, RateLimitConfig};
pub use unit_of_work::{Session, UnitOfWork};

// Re-exports - External backends
#[cfg(feature = "postgres")]
pub use database::{PostgresStore, connect};
#[cfg(feature = "redis")]
pub use rate_limit::{RedisRateLimitConfig, RedisRateLimiter};
