//! CSP violation reports.

use actix_web::{HttpRequest, HttpResponse, web};

/// Max report bytes echoed into the log.
const MAX_LOGGED_REPORT: usize = 2048;

/// POST /csp-violation-report
pub async fn report(req: HttpRequest, body: web::Bytes) -> HttpResponse {
    let report = String::from_utf8_lossy(&body[..body.len().min(MAX_LOGGED_REPORT)]);
    tracing::warn!(
        uri = %req.uri(),
        user_agent = ?req.headers().get("user-agent"),
        report = %report,
        "CSP violation report"
    );

    HttpResponse::Ok().finish()
}
