//! Observability port - per-request metric samples.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// One finished request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSample {
    /// Matched route template (e.g. `/invoices/{id}`), never the raw path.
    pub route: String,
    pub method: String,
    pub status: u16,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
}

/// Fire-and-forget sink for request samples.
///
/// Implementations must not block and must not fail the caller.
pub trait MetricsSink: Send + Sync {
    fn record(&self, sample: RequestSample);
}
