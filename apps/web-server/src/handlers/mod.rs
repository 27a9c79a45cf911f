//! HTTP handlers and route configuration.

mod csp;
mod health;
mod index;
mod invoices;
mod metrics;
mod reviews;
mod webhook;

use actix_web::{HttpRequest, middleware::Compress, web};
use reviews_core::domain::{InvoiceWithReview, Review, format_total};
use reviews_shared::dto::{InvoiceResponse, ReviewResponse};

pub use metrics::MetricsAccess;

use crate::middleware::csrf::{CsrfConfig, CsrfGuard};
use crate::middleware::error::{AppError, AppResult};
use crate::middleware::security_headers::{CSP_REPORT_PATH, SecurityHeaders, SecurityHeadersConfig};

/// Settings for the guarded page routes.
#[derive(Debug, Clone, Default)]
pub struct WebConfig {
    pub csrf: CsrfConfig,
    pub security_headers: SecurityHeadersConfig,
}

/// Configure all application routes.
///
/// `/metrics` sits outside compression. Everything else is compressed, and
/// the page routes additionally get security headers and CSRF protection.
pub fn configure_routes(cfg: &mut web::ServiceConfig, config: &WebConfig) {
    cfg.app_data(form_config())
        .app_data(path_config())
        .route("/metrics", web::get().to(metrics::metrics))
        .service(
            web::scope("")
                .wrap(Compress::default())
                .route("/healthcheck", web::get().to(health::healthcheck))
                .route(CSP_REPORT_PATH, web::post().to(csp::report))
                .service(
                    web::scope("")
                        .wrap(CsrfGuard::new(config.csrf.clone()))
                        .wrap(SecurityHeaders::new(config.security_headers.clone()))
                        .route("/", web::get().to(index::index))
                        .route("/invoices", web::get().to(invoices::list))
                        .route("/invoices", web::post().to(invoices::create))
                        .route("/invoices/{id}", web::delete().to(invoices::delete))
                        .route("/reviews", web::get().to(reviews::list))
                        .route("/reviews", web::post().to(reviews::create))
                        .route("/webhook", web::post().to(webhook::receive)),
                ),
        );
}

/// Fallback for unmatched paths.
pub async fn not_found(req: HttpRequest) -> AppResult<actix_web::HttpResponse> {
    Err(AppError::NotFound(format!("No route for {}", req.path())))
}

fn form_config() -> web::FormConfig {
    web::FormConfig::default()
        .limit(16 * 1024)
        .error_handler(|err, _| AppError::BadRequest(format!("Invalid data: {err}")).into())
}

fn path_config() -> web::PathConfig {
    web::PathConfig::default()
        .error_handler(|err, _| AppError::NotFound(format!("Resource not found: {err}")).into())
}

fn review_response(review: Review) -> ReviewResponse {
    ReviewResponse {
        id: review.id,
        content: review.content,
        created_at: review.created_at,
    }
}

fn invoice_response(row: InvoiceWithReview) -> InvoiceResponse {
    let InvoiceWithReview { invoice, review } = row;
    InvoiceResponse {
        id: invoice.id,
        total: invoice.total,
        total_display: format_total(invoice.total),
        created_at: invoice.created_at,
        review: review.map(review_response),
    }
}
