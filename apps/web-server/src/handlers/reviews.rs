//! Review handlers.

use actix_web::{HttpResponse, web};
use reviews_core::RepoError;
use reviews_core::domain::Review;
use reviews_shared::ApiResponse;
use reviews_shared::dto::{PageResponse, ReviewForm};

use super::review_response;
use crate::middleware::csrf::CsrfToken;
use crate::middleware::error::{AppError, AppResult};
use crate::state::AppState;

/// GET /reviews
pub async fn list(state: web::Data<AppState>, csrf: CsrfToken) -> AppResult<HttpResponse> {
    let reviews = state
        .transaction(|tx| Box::pin(async move { Ok::<_, AppError>(tx.list_reviews().await?) }))
        .await?;

    Ok(HttpResponse::Ok().json(PageResponse {
        items: reviews.into_iter().map(review_response).collect(),
        csrf_token: csrf.into_inner(),
    }))
}

/// POST /reviews
///
/// One review per invoice; the review takes the invoice's id.
pub async fn create(
    state: web::Data<AppState>,
    form: web::Form<ReviewForm>,
) -> AppResult<HttpResponse> {
    let ReviewForm { id, content } = form.into_inner();
    if content.trim().is_empty() {
        return Err(AppError::BadRequest("Review content is required".to_string()));
    }

    let review = state
        .transaction(move |tx| {
            Box::pin(async move {
                if tx.find_invoice(id).await?.is_none() {
                    return Err(AppError::NotFound(
                        "Cannot find a related invoice with this ID".to_string(),
                    ));
                }

                tx.create_review(Review::new(id, content))
                    .await
                    .map_err(|e| match e {
                        RepoError::Constraint(_) => {
                            AppError::Conflict("A review already exists for this invoice".to_string())
                        }
                        other => other.into(),
                    })
            })
        })
        .await?;

    tracing::info!(invoice = %review.id, "Review created");

    Ok(HttpResponse::Created().json(ApiResponse::ok(review_response(review))))
}
