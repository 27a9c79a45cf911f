//! Overview page.

use actix_web::{HttpResponse, web};
use reviews_shared::dto::OverviewResponse;

use super::invoice_response;
use crate::middleware::csrf::CsrfToken;
use crate::middleware::error::{AppError, AppResult};
use crate::state::AppState;

/// GET /
pub async fn index(state: web::Data<AppState>, csrf: CsrfToken) -> AppResult<HttpResponse> {
    let (invoices, invoice_count) = state
        .transaction(|tx| {
            Box::pin(async move {
                let invoices = tx.list_invoices_with_review().await?;
                let count = tx.count_invoices().await?;
                Ok::<_, AppError>((invoices, count))
            })
        })
        .await?;

    Ok(HttpResponse::Ok().json(OverviewResponse {
        invoice_count,
        invoices: invoices.into_iter().map(invoice_response).collect(),
        csrf_token: csrf.into_inner(),
    }))
}
