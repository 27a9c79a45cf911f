//! Prometheus metrics collector.

use std::sync::Arc;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use reviews_core::ports::{MetricsSink, RequestSample};

/// Request metrics, labelled by method, route template and status.
#[derive(Clone)]
pub struct PrometheusMetrics {
    /// Total number of HTTP requests
    pub http_requests_total: IntCounterVec,

    /// HTTP request duration in seconds
    pub http_request_duration_seconds: HistogramVec,

    /// Number of HTTP requests currently in flight
    pub http_requests_in_flight: IntGauge,

    registry: Arc<Registry>,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests").namespace("reviews"),
            &["method", "route", "status"],
        )?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .namespace("reviews")
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["method", "route"],
        )?;

        let http_requests_in_flight = IntGauge::with_opts(
            Opts::new(
                "http_requests_in_flight",
                "Number of HTTP requests currently in flight",
            )
            .namespace("reviews"),
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;

        Ok(Self {
            http_requests_total,
            http_request_duration_seconds,
            http_requests_in_flight,
            registry: Arc::new(registry),
        })
    }

    pub fn set_in_flight(&self, count: usize) {
        self.http_requests_in_flight
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl MetricsSink for PrometheusMetrics {
    fn record(&self, sample: RequestSample) {
        self.http_requests_total
            .with_label_values(&[
                sample.method.as_str(),
                sample.route.as_str(),
                &sample.status.to_string(),
            ])
            .inc();

        self.http_request_duration_seconds
            .with_label_values(&[sample.method.as_str(), sample.route.as_str()])
            .observe(sample.duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn sample(route: &str, status: u16) -> RequestSample {
        RequestSample {
            route: route.to_string(),
            method: "DELETE".to_string(),
            status,
            duration: Duration::from_millis(30),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_record_uses_route_template_labels() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.record(sample("/invoices/{id}", 200));
        metrics.record(sample("/invoices/{id}", 200));
        metrics.record(sample("/invoices/{id}", 404));

        assert_eq!(
            metrics
                .http_requests_total
                .with_label_values(&["DELETE", "/invoices/{id}", "200"])
                .get(),
            2
        );

        let text = metrics.render().unwrap();
        assert!(text.contains("reviews_http_requests_total"));
        assert!(text.contains(r#"route="/invoices/{id}""#));
        assert!(text.contains(r#"status="404""#));
    }

    #[test]
    fn test_collectors_are_isolated() {
        let first = PrometheusMetrics::new().unwrap();
        let second = PrometheusMetrics::new().unwrap();
        first.record(sample("/", 200));

        assert!(!second.render().unwrap().contains(r#"route="/""#));
    }
}
