//! Security response headers for the page routes, error responses included.

use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::rc::Rc;

use actix_web::{
    Error, FromRequest, HttpMessage, HttpRequest,
    dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    error::InternalError,
    http::header::{self, HeaderMap, HeaderName, HeaderValue},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use rand::RngCore;

use super::error::AppError;

/// Where browsers post CSP violation reports.
pub const CSP_REPORT_PATH: &str = "/csp-violation-report";

/// Per-request nonce allowed by the `Content-Security-Policy` for inline
/// scripts and styles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CspNonce(String);

impl CspNonce {
    fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(STANDARD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromRequest for CspNonce {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<CspNonce>()
                .cloned()
                .ok_or_else(|| AppError::Internal("CSP nonce requested outside security headers".to_string())),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct SecurityHeadersConfig {
    /// `Strict-Transport-Security` max-age; `None` disables the header.
    pub hsts_max_age: Option<u64>,
}

impl SecurityHeadersConfig {
    pub fn new(production: bool) -> Self {
        Self {
            hsts_max_age: production.then_some(31_536_000),
        }
    }
}

fn content_security_policy(nonce: &CspNonce) -> String {
    let nonce = nonce.as_str();
    format!(
        "default-src 'self'; script-src 'self' 'nonce-{nonce}'; style-src 'self' 'nonce-{nonce}'; \
         img-src 'self' data:; object-src 'none'; base-uri 'self'; form-action 'self'; \
         frame-ancestors 'none'; report-uri {CSP_REPORT_PATH}"
    )
}

/// Insert a header unless the handler already set it.
fn insert_missing(headers: &mut HeaderMap, name: HeaderName, value: HeaderValue) {
    if !headers.contains_key(&name) {
        headers.insert(name, value);
    }
}

fn add_security_headers(headers: &mut HeaderMap, config: &SecurityHeadersConfig, nonce: &CspNonce) {
    insert_missing(
        headers,
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    insert_missing(headers, header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    insert_missing(
        headers,
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    if let Ok(csp) = HeaderValue::from_str(&content_security_policy(nonce)) {
        insert_missing(headers, header::CONTENT_SECURITY_POLICY, csp);
    }

    if let Some(max_age) = config.hsts_max_age {
        if let Ok(hsts) = HeaderValue::from_str(&format!("max-age={max_age}; includeSubDomains")) {
            insert_missing(headers, header::STRICT_TRANSPORT_SECURITY, hsts);
        }
    }
}

/// Security headers middleware factory.
pub struct SecurityHeaders {
    config: Rc<SecurityHeadersConfig>,
}

impl SecurityHeaders {
    pub fn new(config: SecurityHeadersConfig) -> Self {
        Self {
            config: Rc::new(config),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SecurityHeaders
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = SecurityHeadersService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SecurityHeadersService {
            service,
            config: self.config.clone(),
        }))
    }
}

pub struct SecurityHeadersService<S> {
    service: S,
    config: Rc<SecurityHeadersConfig>,
}

impl<S, B> Service<ServiceRequest> for SecurityHeadersService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let nonce = CspNonce::generate();
        req.extensions_mut().insert(nonce.clone());

        let config = self.config.clone();
        let fut = self.service.call(req);

        Box::pin(async move {
            match fut.await {
                Ok(mut res) => {
                    add_security_headers(res.headers_mut(), &config, &nonce);
                    Ok(res)
                }
                Err(error) => {
                    let mut response = error.error_response();
                    add_security_headers(response.headers_mut(), &config, &nonce);
                    Err(InternalError::from_response(error.to_string(), response).into())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{App, HttpResponse, http::StatusCode, test, web};

    use super::*;
    use crate::middleware::csrf::{CsrfConfig, CsrfGuard};
    use crate::middleware::error::{AppResult, ErrorNegotiation};

    fn assert_security_headers(headers: &HeaderMap) {
        assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
        assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
        assert!(headers.contains_key(header::CONTENT_SECURITY_POLICY));
    }

    async fn missing() -> AppResult<HttpResponse> {
        Err(AppError::NotFound("Invoice not found".to_string()))
    }

    async fn page(nonce: CspNonce) -> HttpResponse {
        HttpResponse::Ok().body(nonce.as_str().to_string())
    }

    async fn framed() -> HttpResponse {
        HttpResponse::Ok()
            .insert_header((header::X_FRAME_OPTIONS, "SAMEORIGIN"))
            .finish()
    }

    #[actix_web::test]
    async fn test_headers_and_nonce() {
        let app = test::init_service(
            App::new()
                .wrap(SecurityHeaders::new(SecurityHeadersConfig::new(false)))
                .route("/", web::get().to(page)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        let headers = resp.headers().clone();
        let nonce = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();

        assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
        assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
        assert_eq!(
            headers.get(header::REFERRER_POLICY).unwrap(),
            "strict-origin-when-cross-origin"
        );
        let csp = headers
            .get(header::CONTENT_SECURITY_POLICY)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(csp.contains(&format!("'nonce-{nonce}'")));
        assert!(csp.contains("report-uri /csp-violation-report"));
        assert!(headers.get(header::STRICT_TRANSPORT_SECURITY).is_none());
    }

    #[actix_web::test]
    async fn test_nonce_differs_per_request() {
        let app = test::init_service(
            App::new()
                .wrap(SecurityHeaders::new(SecurityHeadersConfig::new(false)))
                .route("/", web::get().to(page)),
        )
        .await;

        let first = test::call_and_read_body(&app, test::TestRequest::get().uri("/").to_request()).await;
        let second = test::call_and_read_body(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_ne!(first, second);
    }

    #[actix_web::test]
    async fn test_hsts_in_production_and_handler_headers_win() {
        let app = test::init_service(
            App::new()
                .wrap(SecurityHeaders::new(SecurityHeadersConfig::new(true)))
                .route("/framed", web::get().to(framed)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/framed").to_request()).await;

        assert_eq!(resp.headers().get(header::X_FRAME_OPTIONS).unwrap(), "SAMEORIGIN");
        assert_eq!(
            resp.headers().get(header::STRICT_TRANSPORT_SECURITY).unwrap(),
            "max-age=31536000; includeSubDomains"
        );
    }

    #[actix_web::test]
    async fn test_csrf_rejections_carry_headers() {
        let app = test::init_service(
            App::new()
                .wrap(CsrfGuard::new(CsrfConfig::default()))
                .wrap(SecurityHeaders::new(SecurityHeadersConfig::new(false)))
                .wrap(ErrorNegotiation)
                .route("/invoices", web::post().to(|| async { HttpResponse::Created().finish() })),
        )
        .await;

        let req = test::TestRequest::post().uri("/invoices").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_security_headers(resp.headers());
    }

    #[actix_web::test]
    async fn test_handler_errors_carry_headers() {
        let app = test::init_service(
            App::new()
                .wrap(SecurityHeaders::new(SecurityHeadersConfig::new(false)))
                .wrap(ErrorNegotiation)
                .route("/missing", web::get().to(missing)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/missing").to_request()).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_security_headers(resp.headers());
    }

    #[actix_web::test]
    async fn test_returned_errors_carry_headers() {
        let app = test::init_service(
            App::new()
                .wrap_fn(|_, _| async {
                    Err::<ServiceResponse, Error>(AppError::Unavailable("draining".to_string()).into())
                })
                .wrap(SecurityHeaders::new(SecurityHeadersConfig::new(false)))
                .route("/", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let error = match test::try_call_service(&app, test::TestRequest::get().uri("/").to_request()).await {
            Ok(resp) => panic!("expected an error, got {}", resp.status()),
            Err(error) => error,
        };
        let resp = error.error_response();

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_security_headers(resp.headers());
    }
}
