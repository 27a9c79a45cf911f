//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod notify;
mod observability;
mod rate_limit;
mod repository;
mod unit_of_work;

pub use notify::{NotifyError, Notifier};
pub use observability::{MetricsSink, RequestSample};
pub use rate_limit::{RateLimitError, RateLimitResult, RateLimiter};
pub use repository::{InvoiceRepository, ReviewRepository};
pub use unit_of_work::{ResolutionAction, SessionState, Transaction, TransactionalStore};
