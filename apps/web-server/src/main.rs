//! # Reviews Web Server
//!
//! The main entry point for the Actix-web HTTP server.

use std::sync::Arc;

use actix_web::HttpServer;
use reviews_core::ports::{Notifier, RateLimiter};
use reviews_infra::{ConsoleNotifier, InMemoryRateLimiter, WebhookNotifier};

use web_server::config::{AppConfig, RateLimitBackend, RateLimitSettings};
use web_server::lifecycle::{InFlightTracker, ShutdownOrchestrator, wait_for_interrupt};
use web_server::observability::PrometheusMetrics;
use web_server::state::AppState;
use web_server::telemetry::{TelemetryConfig, init_telemetry};
use web_server::{AppComponents, build_app};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env();
    init_telemetry(&TelemetryConfig::from_env(config.environment));

    tracing::info!(
        host = %config.host,
        port = config.port,
        environment = %config.environment,
        public_url = %config.public_url,
        "Starting reviews web server"
    );

    let state = AppState::new(&config).await;
    let limiter = build_rate_limiter(&config.rate_limit).await;
    let notifier = build_notifier(&config);
    let metrics = Arc::new(PrometheusMetrics::new()?);
    let in_flight = InFlightTracker::new();

    let components = AppComponents::new(&config, state, limiter, metrics, in_flight.clone());

    // Signals are handled by the shutdown orchestrator, not by actix.
    let server = HttpServer::new(move || build_app(components.clone()))
        .disable_signals()
        .shutdown_timeout(config.shutdown_timeout.as_secs())
        .bind((config.host.as_str(), config.port))?
        .run();
    let handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    let orchestrator = ShutdownOrchestrator::new(in_flight, config.shutdown_timeout, notifier);
    let outcome = orchestrator.run(wait_for_interrupt(), &handle).await;

    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Server exited with an error"),
        Err(e) => tracing::error!(error = %e, "Server task failed"),
    }

    let reason = outcome?;
    tracing::info!(reason = ?reason, "Server stopped");
    Ok(())
}

async fn build_rate_limiter(settings: &RateLimitSettings) -> Arc<dyn RateLimiter> {
    match settings.backend {
        RateLimitBackend::Redis => match redis_rate_limiter(settings).await {
            Some(limiter) => limiter,
            None => memory_rate_limiter(settings),
        },
        RateLimitBackend::Memory => memory_rate_limiter(settings),
    }
}

fn memory_rate_limiter(settings: &RateLimitSettings) -> Arc<dyn RateLimiter> {
    let limiter = Arc::new(InMemoryRateLimiter::new(settings.limits.clone()));
    InMemoryRateLimiter::spawn_sweeper(&limiter);

    tracing::info!(
        max_requests = settings.limits.max_requests,
        window = ?settings.limits.window,
        max_keys = settings.limits.max_keys,
        "Using in-memory rate limiter"
    );
    limiter
}

#[cfg(feature = "redis")]
async fn redis_rate_limiter(settings: &RateLimitSettings) -> Option<Arc<dyn RateLimiter>> {
    use reviews_infra::{RedisRateLimitConfig, RedisRateLimiter};

    let Some(url) = settings.redis_url.clone() else {
        tracing::warn!("RATE_LIMIT_BACKEND=redis but REDIS_URL not set. Falling back to memory.");
        return None;
    };

    let config = RedisRateLimitConfig {
        url,
        max_requests: settings.limits.max_requests,
        window: settings.limits.window,
        ..RedisRateLimitConfig::default()
    };

    match RedisRateLimiter::new(config).await {
        Ok(limiter) => {
            tracing::info!("Using Redis rate limiter");
            Some(Arc::new(limiter))
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to Redis. Falling back to memory.");
            None
        }
    }
}

#[cfg(not(feature = "redis"))]
async fn redis_rate_limiter(_settings: &RateLimitSettings) -> Option<Arc<dyn RateLimiter>> {
    tracing::warn!("Built without the redis feature. Falling back to memory rate limiter.");
    None
}

fn build_notifier(config: &AppConfig) -> Arc<dyn Notifier> {
    match &config.notify_webhook_url {
        Some(url) => {
            tracing::info!("Shutdown alerts go to the configured webhook");
            Arc::new(WebhookNotifier::new(url.clone()))
        }
        None => Arc::new(ConsoleNotifier),
    }
}
