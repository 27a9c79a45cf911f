//! Health check endpoint.

use actix_web::{HttpResponse, web};

use crate::state::AppState;

/// Answers `"OK"` after the configured delay.
///
/// The delay is there to validate load balancer timeouts. It is a timer, so
/// it never holds up other requests.
///
/// GET /healthcheck
pub async fn healthcheck(state: web::Data<AppState>) -> HttpResponse {
    if !state.healthcheck_delay.is_zero() {
        tokio::time::sleep(state.healthcheck_delay).await;
    }

    HttpResponse::Ok().json("OK")
}
