//! Inbound webhook. Called by servers, so it carries no CSRF token.

use actix_web::{HttpRequest, HttpResponse, web};

/// POST /webhook
pub async fn receive(req: HttpRequest, body: web::Bytes) -> HttpResponse {
    tracing::info!(
        content_type = ?req.headers().get("content-type"),
        bytes = body.len(),
        "Webhook received"
    );

    HttpResponse::NoContent().finish()
}
