//! Prometheus exposition endpoint.

use actix_web::{HttpRequest, HttpResponse, http::header, web};
use constant_time_eq::constant_time_eq;

use crate::lifecycle::InFlightTracker;
use crate::middleware::error::{AppError, AppResult};
use crate::observability::PrometheusMetrics;

/// Who may scrape `/metrics`.
///
/// With a token configured, a matching `Authorization: Bearer` header is
/// required. Without one, only loopback peers are admitted.
#[derive(Debug, Clone, Default)]
pub struct MetricsAccess {
    token: Option<String>,
}

impl MetricsAccess {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    pub fn permits(&self, req: &HttpRequest) -> bool {
        match &self.token {
            Some(expected) => bearer_token(req)
                .is_some_and(|presented| constant_time_eq(presented.as_bytes(), expected.as_bytes())),
            None => req.peer_addr().is_some_and(|peer| peer.ip().is_loopback()),
        }
    }
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// GET /metrics
pub async fn metrics(
    req: HttpRequest,
    access: web::Data<MetricsAccess>,
    metrics: web::Data<PrometheusMetrics>,
    in_flight: web::Data<InFlightTracker>,
) -> AppResult<HttpResponse> {
    if !access.permits(&req) {
        tracing::warn!(peer = ?req.peer_addr(), "Metrics access denied");
        return Err(AppError::Forbidden("metrics access denied".to_string()));
    }

    metrics.set_in_flight(in_flight.count());
    let body = metrics
        .render()
        .map_err(|e| AppError::Internal(format!("failed to render metrics: {e}")))?;

    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4; charset=utf-8")
        .body(body))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use actix_web::{App, http::StatusCode, test};

    use super::*;

    fn peer(addr: &str) -> SocketAddr {
        addr.parse().unwrap()
    }

    macro_rules! app {
        ($token:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(MetricsAccess::new($token)))
                    .app_data(web::Data::new(PrometheusMetrics::new().unwrap()))
                    .app_data(web::Data::new(InFlightTracker::new()))
                    .route("/metrics", web::get().to(metrics)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_loopback_scrape_without_token() {
        let app = app!(None);

        let req = test::TestRequest::get()
            .uri("/metrics")
            .peer_addr(peer("127.0.0.1:40000"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(
            resp.headers()
                .get(header::CONTENT_TYPE)
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("text/plain; version=0.0.4")
        );

        let body = test::read_body(resp).await;
        assert!(String::from_utf8_lossy(&body).contains("reviews_http_requests_in_flight"));
    }

    #[actix_web::test]
    async fn test_remote_scrape_without_token_is_forbidden() {
        let app = app!(None);

        let req = test::TestRequest::get()
            .uri("/metrics")
            .peer_addr(peer("203.0.113.9:40000"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_token_is_required_when_configured() {
        let app = app!(Some("s3cret".to_string()));

        let loopback = test::TestRequest::get()
            .uri("/metrics")
            .peer_addr(peer("127.0.0.1:40000"))
            .to_request();
        assert_eq!(test::call_service(&app, loopback).await.status(), StatusCode::FORBIDDEN);

        let wrong = test::TestRequest::get()
            .uri("/metrics")
            .insert_header((header::AUTHORIZATION, "Bearer nope"))
            .to_request();
        assert_eq!(test::call_service(&app, wrong).await.status(), StatusCode::FORBIDDEN);

        let right = test::TestRequest::get()
            .uri("/metrics")
            .insert_header((header::AUTHORIZATION, "Bearer s3cret"))
            .to_request();
        assert_eq!(test::call_service(&app, right).await.status(), StatusCode::OK);
    }
}
