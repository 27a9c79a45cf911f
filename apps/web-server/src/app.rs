//! Application assembly - shared components and the middleware chain.

use std::sync::Arc;

use actix_web::{
    App, Error,
    body::MessageBody,
    dev::{ServiceFactory, ServiceRequest, ServiceResponse},
    web,
};
use reviews_core::ports::RateLimiter;
use tracing_actix_web::TracingLogger;

use crate::config::AppConfig;
use crate::handlers::{self, MetricsAccess, WebConfig};
use crate::lifecycle::InFlightTracker;
use crate::middleware::csrf::CsrfConfig;
use crate::middleware::error::ErrorNegotiation;
use crate::middleware::monitoring::Monitoring;
use crate::middleware::rate_limit::RateLimitMiddleware;
use crate::middleware::security_headers::SecurityHeadersConfig;
use crate::observability::PrometheusMetrics;
use crate::state::AppState;

/// Everything the app factory needs, shared by all workers.
#[derive(Clone)]
pub struct AppComponents {
    pub state: AppState,
    pub limiter: Arc<dyn RateLimiter>,
    pub metrics: Arc<PrometheusMetrics>,
    pub in_flight: InFlightTracker,
    pub metrics_access: MetricsAccess,
    pub web: WebConfig,
    pub trust_forwarded_for: bool,
}

impl AppComponents {
    pub fn new(
        config: &AppConfig,
        state: AppState,
        limiter: Arc<dyn RateLimiter>,
        metrics: Arc<PrometheusMetrics>,
        in_flight: InFlightTracker,
    ) -> Self {
        let production = config.environment.is_production();

        Self {
            state,
            limiter,
            metrics,
            in_flight,
            metrics_access: MetricsAccess::new(config.metrics_token.clone()),
            web: WebConfig {
                csrf: CsrfConfig {
                    secure_cookie: production,
                    exempt_paths: config.csrf_exempt_paths.clone(),
                },
                security_headers: SecurityHeadersConfig::new(production),
            },
            trust_forwarded_for: config.rate_limit.trust_forwarded_for,
        }
    }
}

/// Build the application.
///
/// Middleware, outermost first: request tracing, error negotiation, in-flight
/// tracking, rate limiting, monitoring. Per-group middleware is set up in
/// [`handlers::configure_routes`].
pub fn build_app(
    components: AppComponents,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = Error,
        InitError = (),
    >,
> {
    let AppComponents {
        state,
        limiter,
        metrics,
        in_flight,
        metrics_access,
        web: web_config,
        trust_forwarded_for,
    } = components;

    App::new()
        .app_data(web::Data::new(state))
        .app_data(web::Data::from(metrics.clone()))
        .app_data(web::Data::new(metrics_access))
        .app_data(web::Data::new(in_flight.clone()))
        .configure(|cfg| handlers::configure_routes(cfg, &web_config))
        .default_service(web::to(handlers::not_found))
        .wrap(Monitoring::new(metrics))
        .wrap(RateLimitMiddleware::new(limiter).trust_forwarded_for(trust_forwarded_for))
        .wrap(in_flight.middleware())
        .wrap(ErrorNegotiation)
        .wrap(TracingLogger::default())
}
