//! Observability module - request metrics and their exposition.

mod metrics;

pub use metrics::PrometheusMetrics;
