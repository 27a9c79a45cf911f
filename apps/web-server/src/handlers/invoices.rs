//! Invoice handlers.

use actix_web::{HttpResponse, web};
use reviews_core::RepoError;
use reviews_core::domain::{Invoice, InvoiceWithReview, parse_total};
use reviews_shared::ApiResponse;
use reviews_shared::dto::{DeleteInvoiceResponse, InvoiceForm, PageResponse};
use uuid::Uuid;

use super::invoice_response;
use crate::middleware::csrf::CsrfToken;
use crate::middleware::error::{AppError, AppResult};
use crate::state::AppState;

/// GET /invoices
pub async fn list(state: web::Data<AppState>, csrf: CsrfToken) -> AppResult<HttpResponse> {
    let invoices = state
        .transaction(|tx| {
            Box::pin(async move { Ok::<_, AppError>(tx.list_invoices_with_review().await?) })
        })
        .await?;

    Ok(HttpResponse::Ok().json(PageResponse {
        items: invoices.into_iter().map(invoice_response).collect(),
        csrf_token: csrf.into_inner(),
    }))
}

/// POST /invoices
pub async fn create(
    state: web::Data<AppState>,
    form: web::Form<InvoiceForm>,
) -> AppResult<HttpResponse> {
    let total = parse_total(&form.total)?;

    let invoice = state
        .transaction(move |tx| {
            Box::pin(async move {
                Ok::<_, AppError>(tx.create_invoice(Invoice::new(total)).await?)
            })
        })
        .await?;

    tracing::info!(invoice = %invoice.id, total = invoice.total, "Invoice created");

    Ok(HttpResponse::Created().json(ApiResponse::ok(invoice_response(InvoiceWithReview {
        invoice,
        review: None,
    }))))
}

/// DELETE /invoices/{id}
///
/// Answers with the number of invoices left so the page can show its empty
/// state.
pub async fn delete(state: web::Data<AppState>, path: web::Path<Uuid>) -> AppResult<HttpResponse> {
    let id = path.into_inner();

    let remaining = state
        .transaction(move |tx| {
            Box::pin(async move {
                tx.delete_invoice(id).await.map_err(|e| match e {
                    RepoError::NotFound => AppError::NotFound("Invoice could not be deleted".to_string()),
                    other => other.into(),
                })?;
                Ok::<_, AppError>(tx.count_invoices().await?)
            })
        })
        .await?;

    tracing::info!(invoice = %id, remaining, "Invoice deleted");

    Ok(HttpResponse::Ok().json(DeleteInvoiceResponse { remaining }))
}
