//! Error handling - the application error type and the boundary that turns
//! every failed request into a structured or rendered error response.

use std::fmt;
use std::future::{Future, Ready, ready};
use std::pin::Pin;

use actix_web::{
    Error, HttpResponse, ResponseError,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    error::InternalError,
    http::{
        StatusCode,
        header::{self, HeaderMap},
    },
};
use reviews_core::{DomainError, RepoError, UnitOfWorkError};
use reviews_shared::ErrorResponse;

/// Application-level error type.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    /// Anti-forgery check failed.
    Forbidden(String),
    Conflict(String),
    /// Rate limit hit; the client may retry after this many seconds.
    TooManyRequests { retry_after_secs: u64 },
    /// Backing store unreachable, request timed out, or server draining.
    Unavailable(String),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::Forbidden(msg)
            | AppError::Conflict(msg)
            | AppError::Unavailable(msg) => write!(f, "{msg}"),
            AppError::TooManyRequests { retry_after_secs } => write!(
                f,
                "Too many requests. Try again in {retry_after_secs} seconds."
            ),
            AppError::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let mut builder = HttpResponse::build(status);

        let message = match self {
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                GENERIC_SERVER_ERROR.to_string()
            }
            AppError::TooManyRequests { retry_after_secs } => {
                builder
                    .insert_header((header::RETRY_AFTER, retry_after_secs.to_string()))
                    .insert_header(("X-RateLimit-Remaining", "0"));
                self.to_string()
            }
            AppError::Unavailable(_) => {
                builder.insert_header((header::CONNECTION, "close"));
                self.to_string()
            }
            other => other.to_string(),
        };

        builder.json(ErrorResponse::new(status.as_u16(), message))
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => AppError::BadRequest(msg),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => AppError::NotFound("Resource not found".to_string()),
            RepoError::Constraint(msg) => AppError::Conflict(msg),
            RepoError::Connection(msg) => {
                tracing::error!("Database connection error: {}", msg);
                AppError::Unavailable("Database unavailable".to_string())
            }
            RepoError::Query(msg) => AppError::Internal(format!("Database query error: {msg}")),
        }
    }
}

impl From<UnitOfWorkError> for AppError {
    fn from(err: UnitOfWorkError) -> Self {
        match err {
            UnitOfWorkError::Connectivity(_) => {
                AppError::Unavailable("Server is not accessible to serve this request".to_string())
            }
            UnitOfWorkError::TimedOut(_) => AppError::Unavailable("Request timed out".to_string()),
            other @ (UnitOfWorkError::Resolution { .. } | UnitOfWorkError::AlreadyResolved(_)) => {
                AppError::Internal(other.to_string())
            }
        }
    }
}

/// Result type alias for handlers.
pub type AppResult<T> = Result<T, AppError>;

const GENERIC_SERVER_ERROR: &str = "Internal Server Error";
const RENDERED_SERVER_ERROR: &str = "Something went wrong on our end. Please try again later.";
const RENDERED_NOT_FOUND: &str = "Page Not Found";

/// How an error is presented, decided once per request from `Accept`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// JSON [`ErrorResponse`] for machine clients.
    Structured,
    /// HTML error page for browsers.
    Rendered,
}

impl ResponseFormat {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let wants_json = headers
            .get_all(header::ACCEPT)
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.contains("application/json"));

        if wants_json {
            ResponseFormat::Structured
        } else {
            ResponseFormat::Rendered
        }
    }

    /// Build the error response for `status`.
    ///
    /// `message` is the error's own text. Server errors never expose it;
    /// structured bodies carry the status reason phrase instead. Rendered
    /// not-found pages use a generic message.
    pub fn respond(self, status: StatusCode, message: &str) -> HttpResponse {
        match self {
            ResponseFormat::Structured => {
                let message = if status.is_server_error() {
                    status.canonical_reason().unwrap_or(GENERIC_SERVER_ERROR)
                } else {
                    message
                };
                HttpResponse::build(status).json(ErrorResponse::new(status.as_u16(), message))
            }
            ResponseFormat::Rendered => {
                let message = if status == StatusCode::NOT_FOUND {
                    RENDERED_NOT_FOUND
                } else if status.is_server_error() {
                    RENDERED_SERVER_ERROR
                } else {
                    message
                };
                HttpResponse::build(status)
                    .content_type("text/html; charset=utf-8")
                    .body(render_error_page(status, message))
            }
        }
    }
}

fn render_error_page(status: StatusCode, message: &str) -> String {
    let code = status.as_u16();
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{code} | Reviews</title></head>\n\
         <body><main><h1>{code}</h1><p>{}</p><a href=\"/\">Back to home</a></main></body>\n</html>\n",
        escape_html(message)
    )
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Re-render an error response in `format`, keeping headers such as
/// `Retry-After` from the original.
fn negotiate(
    format: ResponseFormat,
    status: StatusCode,
    error: &Error,
    original_headers: &HeaderMap,
) -> HttpResponse {
    let mut response = format.respond(status, &error.to_string());

    for (name, value) in original_headers {
        if name == header::CONTENT_TYPE || name == header::CONTENT_LENGTH {
            continue;
        }
        response.headers_mut().insert(name.clone(), value.clone());
    }

    response
}

/// Error boundary middleware.
///
/// Re-renders error responses produced by handlers and inner middleware in
/// the format the client asked for. Errors returned instead of a response
/// are rendered the same way and handed to the server as the error's
/// response.
pub struct ErrorNegotiation;

impl<S, B> Transform<S, ServiceRequest> for ErrorNegotiation
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = ErrorNegotiationService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ErrorNegotiationService { service }))
    }
}

pub struct ErrorNegotiationService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for ErrorNegotiationService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // The router needs sole ownership of the request, so nothing here may
        // keep a handle to it across the inner call.
        let format = ResponseFormat::from_headers(req.headers());
        let fut = self.service.call(req);

        Box::pin(async move {
            match fut.await {
                Ok(res) => {
                    let negotiated = res.response().error().map(|error| {
                        negotiate(format, res.status(), error, res.headers())
                    });
                    match negotiated {
                        None => Ok(res.map_into_left_body()),
                        Some(response) => {
                            let (http_req, _) = res.into_parts();
                            Ok(ServiceResponse::new(http_req, response).map_into_right_body())
                        }
                    }
                }
                // Inner middleware answers with error responses, so only a
                // recovered panic lands here, with the request already gone.
                // The negotiated response rides on the error instead.
                Err(error) => {
                    let original = error.error_response();
                    let response = negotiate(format, original.status(), &error, original.headers());
                    Err(InternalError::from_response(error.to_string(), response).into())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{App, HttpResponse, test, web};

    use super::*;

    async fn missing() -> AppResult<HttpResponse> {
        Err(AppError::NotFound("Invoice 42 not found".to_string()))
    }

    async fn broken() -> AppResult<HttpResponse> {
        Err(AppError::Internal("connection reset by peer".to_string()))
    }

    async fn limited() -> AppResult<HttpResponse> {
        Err(AppError::TooManyRequests { retry_after_secs: 3 })
    }

    async fn invoice(id: web::Path<u32>) -> HttpResponse {
        HttpResponse::Ok().body(id.into_inner().to_string())
    }

    macro_rules! app {
        () => {
            test::init_service(
                App::new()
                    .wrap(ErrorNegotiation)
                    .route("/missing", web::get().to(missing))
                    .route("/broken", web::get().to(broken))
                    .route("/limited", web::get().to(limited))
                    .route("/invoices/{id}", web::get().to(invoice))
                    .route("/ok", web::get().to(|| async { HttpResponse::Ok().body("fine") })),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_format_follows_accept_header() {
        let req = test::TestRequest::default()
            .insert_header((header::ACCEPT, "application/json, text/plain"))
            .to_srv_request();
        assert_eq!(ResponseFormat::from_headers(req.headers()), ResponseFormat::Structured);

        let req = test::TestRequest::default()
            .insert_header((header::ACCEPT, "text/html"))
            .to_srv_request();
        assert_eq!(ResponseFormat::from_headers(req.headers()), ResponseFormat::Rendered);

        let req = test::TestRequest::default().to_srv_request();
        assert_eq!(ResponseFormat::from_headers(req.headers()), ResponseFormat::Rendered);
    }

    #[actix_web::test]
    async fn test_json_clients_get_structured_body() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/missing")
            .insert_header((header::ACCEPT, "application/json"))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body, ErrorResponse::new(404, "Invoice 42 not found"));
    }

    #[actix_web::test]
    async fn test_browsers_get_generic_not_found_page() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/missing")
            .insert_header((header::ACCEPT, "text/html"))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html; charset=utf-8"
        );

        let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
        assert!(body.contains("Page Not Found"));
        assert!(!body.contains("Invoice 42"));
    }

    #[actix_web::test]
    async fn test_server_errors_hide_details() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/broken")
            .insert_header((header::ACCEPT, "application/json"))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.message, "Internal Server Error");
    }

    #[actix_web::test]
    async fn test_headers_survive_negotiation() {
        let app = app!();
        let req = test::TestRequest::get().uri("/limited").to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get(header::RETRY_AFTER).unwrap(), "3");
        assert!(
            resp.headers()
                .get(header::CONTENT_TYPE)
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("text/html")
        );
    }

    #[actix_web::test]
    async fn test_successful_responses_pass_through() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/ok")
            .insert_header((header::ACCEPT, "application/json"))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, "fine");
    }

    #[actix_web::test]
    async fn test_routed_requests_with_path_params_reach_handler() {
        let app = app!();
        let req = test::TestRequest::get().uri("/invoices/42").to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, "42");
    }

    #[actix_web::test]
    async fn test_returned_errors_carry_negotiated_response() {
        let app = test::init_service(
            App::new()
                .wrap_fn(|_, _| async {
                    Err::<ServiceResponse, Error>(
                        AppError::TooManyRequests { retry_after_secs: 5 }.into(),
                    )
                })
                .wrap(ErrorNegotiation)
                .route("/", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/")
            .insert_header((header::ACCEPT, "application/json"))
            .to_request();

        let error = match test::try_call_service(&app, req).await {
            Ok(resp) => panic!("expected an error, got {}", resp.status()),
            Err(error) => error,
        };
        let resp = error.error_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get(header::RETRY_AFTER).unwrap(), "5");
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[actix_web::test]
    async fn test_rendered_page_escapes_message() {
        let resp = ResponseFormat::Rendered.respond(StatusCode::BAD_REQUEST, "<script>");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(render_error_page(StatusCode::BAD_REQUEST, "<script>").contains("&lt;script&gt;"));
    }

    #[actix_web::test]
    async fn test_unit_of_work_errors_map_to_statuses() {
        let err: AppError = UnitOfWorkError::Connectivity("refused".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let err: AppError = UnitOfWorkError::Resolution {
            action: reviews_core::ports::ResolutionAction::Commit,
            message: "serialization failure".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
