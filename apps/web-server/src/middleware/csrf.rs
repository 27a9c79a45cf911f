//! CSRF protection - double-submit cookie.
//!
//! Every request on the guarded routes is bound to the token stored in the
//! `csrf_token` cookie, issuing a fresh one when the cookie is absent.
//! State-changing requests must echo that token back in the `_csrf` form
//! field or the `X-CSRF-Token` header; either one matching is enough. Handlers read the token through the
//! [`CsrfToken`] extractor to embed it in their forms.

use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::rc::Rc;

use actix_web::{
    Error, FromRequest, HttpMessage, HttpRequest,
    body::EitherBody,
    cookie::{Cookie, SameSite, time::Duration as CookieDuration},
    dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::Method,
    web::Bytes,
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;

use super::error::AppError;

/// Cookie holding the token bound to the browser session.
pub const CSRF_COOKIE_NAME: &str = "csrf_token";

/// Form field checked on state-changing requests.
pub const CSRF_FORM_FIELD: &str = "_csrf";

/// Header checked alongside the form field.
pub const CSRF_HEADER: &str = "X-CSRF-Token";

/// Cookie max age in seconds (24 hours).
pub const CSRF_COOKIE_MAX_AGE: i64 = 86400;

const TOKEN_BYTES: usize = 32;

/// An issued anti-forgery token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken(String);

impl CsrfToken {
    /// Generate a new token: 32 random bytes as URL-safe base64.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Parse a token received from a client, rejecting anything this server
    /// could not have issued.
    pub fn parse(raw: &str) -> Option<Self> {
        let decoded = URL_SAFE_NO_PAD.decode(raw).ok()?;
        (decoded.len() == TOKEN_BYTES).then(|| Self(raw.to_string()))
    }

    /// The token bound to `cookie`, or a new one when there is none.
    ///
    /// Issuing twice for the same cookie yields the same token.
    pub fn issue(cookie: Option<&str>) -> Self {
        cookie.and_then(Self::parse).unwrap_or_else(Self::generate)
    }

    /// True when `presented` equals this token. Compared in constant time.
    pub fn matches(&self, presented: Option<&str>) -> bool {
        match presented {
            Some(presented) if !presented.is_empty() => {
                constant_time_eq::constant_time_eq(self.0.as_bytes(), presented.as_bytes())
            }
            _ => false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Extractor for handlers behind [`CsrfGuard`].
impl FromRequest for CsrfToken {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<CsrfToken>()
                .cloned()
                .ok_or_else(|| AppError::Internal("CSRF token requested outside the guard".to_string())),
        )
    }
}

/// Guard configuration.
#[derive(Debug, Clone, Default)]
pub struct CsrfConfig {
    /// Set the `Secure` cookie attribute. On in production only, since local
    /// development runs over plain HTTP.
    pub secure_cookie: bool,
    /// Paths that skip validation entirely, e.g. webhooks called by servers.
    pub exempt_paths: Vec<String>,
}

impl CsrfConfig {
    fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.iter().any(|exempt| exempt == path)
    }

    fn cookie(&self, token: &CsrfToken) -> Cookie<'static> {
        Cookie::build(CSRF_COOKIE_NAME, token.as_str().to_string())
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookie)
            .max_age(CookieDuration::seconds(CSRF_COOKIE_MAX_AGE))
            .finish()
    }
}

fn is_safe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// Tokens presented by the client: the form field, then the header.
///
/// Reading the form consumes the body, so it is put back for the handler.
async fn presented_tokens(req: &mut ServiceRequest) -> Result<Vec<String>, Error> {
    let mut presented = Vec::with_capacity(2);

    if req.content_type() == "application/x-www-form-urlencoded" {
        let body = req.extract::<Bytes>().await?;
        let field = serde_urlencoded::from_bytes::<Vec<(String, String)>>(&body)
            .ok()
            .and_then(|pairs| {
                pairs
                    .into_iter()
                    .find(|(name, _)| name == CSRF_FORM_FIELD)
                    .map(|(_, value)| value)
            });
        req.set_payload(Payload::from(body));
        presented.extend(field);
    }

    presented.extend(
        req.headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
    );

    Ok(presented)
}

/// CSRF middleware factory.
pub struct CsrfGuard {
    config: Rc<CsrfConfig>,
}

impl CsrfGuard {
    pub fn new(config: CsrfConfig) -> Self {
        Self {
            config: Rc::new(config),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for CsrfGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = CsrfGuardService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CsrfGuardService {
            service: Rc::new(service),
            config: self.config.clone(),
        }))
    }
}

pub struct CsrfGuardService<S> {
    service: Rc<S>,
    config: Rc<CsrfConfig>,
}

impl<S, B> Service<ServiceRequest> for CsrfGuardService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let config = self.config.clone();

        let bound = req
            .cookie(CSRF_COOKIE_NAME)
            .and_then(|cookie| CsrfToken::parse(cookie.value()));
        let token = bound.clone().unwrap_or_else(CsrfToken::generate);
        req.extensions_mut().insert(token.clone());

        let must_validate = !is_safe_method(req.method()) && !config.is_exempt(req.path());

        Box::pin(async move {
            if must_validate {
                let presented = match presented_tokens(&mut req).await {
                    Ok(presented) => presented,
                    Err(e) => return Ok(req.error_response(e).map_into_right_body()),
                };
                let valid = bound.as_ref().is_some_and(|bound| {
                    presented
                        .iter()
                        .any(|candidate| bound.matches(Some(candidate.as_str())))
                });

                if !valid {
                    tracing::warn!(
                        path = %req.path(),
                        cookie_present = bound.is_some(),
                        tokens_presented = presented.len(),
                        "CSRF validation failed"
                    );
                    let rejection = AppError::Forbidden("invalid csrf token".to_string());
                    return Ok(req.error_response(rejection).map_into_right_body());
                }
            }

            let mut res = service.call(req).await?;
            res.response_mut().add_cookie(&config.cookie(&token))?;
            Ok(res.map_into_left_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{App, HttpResponse, http::StatusCode, http::header, test, web};
    use serde::Deserialize;

    use super::*;
    use crate::middleware::error::ErrorNegotiation;

    #[derive(Deserialize)]
    struct NoteForm {
        note: String,
    }

    async fn show(token: CsrfToken) -> HttpResponse {
        HttpResponse::Ok().body(token.into_inner())
    }

    async fn submit(form: web::Form<NoteForm>) -> HttpResponse {
        HttpResponse::Ok().body(form.into_inner().note)
    }

    macro_rules! app {
        ($secure:expr) => {
            test::init_service(
                App::new()
                    .wrap(CsrfGuard::new(CsrfConfig {
                        secure_cookie: $secure,
                        exempt_paths: vec!["/webhook".to_string()],
                    }))
                    .wrap(ErrorNegotiation)
                    .route("/form", web::get().to(show))
                    .route("/form", web::post().to(submit))
                    .route("/webhook", web::post().to(|| async { HttpResponse::NoContent().finish() })),
            )
            .await
        };
    }

    fn cookie_token(resp: &ServiceResponse<impl actix_web::body::MessageBody>) -> String {
        resp.response()
            .cookies()
            .find(|c| c.name() == CSRF_COOKIE_NAME)
            .map(|c| c.value().to_string())
            .unwrap()
    }

    #[actix_web::test]
    async fn test_issue_is_idempotent_for_a_session() {
        let first = CsrfToken::issue(None);
        let again = CsrfToken::issue(Some(first.as_str()));
        let third = CsrfToken::issue(Some(first.as_str()));

        assert_eq!(first, again);
        assert_eq!(again, third);
        assert_eq!(first.as_str().len(), 43);
    }

    #[actix_web::test]
    async fn test_forged_cookies_are_replaced() {
        let issued = CsrfToken::issue(Some("attacker-chosen"));
        assert_ne!(issued.as_str(), "attacker-chosen");
    }

    #[actix_web::test]
    async fn test_matches_rejects_missing_empty_and_foreign_tokens() {
        let token = CsrfToken::generate();
        let other = CsrfToken::generate();

        assert!(token.matches(Some(token.as_str())));
        assert!(!token.matches(None));
        assert!(!token.matches(Some("")));
        assert!(!token.matches(Some(other.as_str())));
        assert!(!token.matches(Some(&token.as_str()[..10])));
    }

    #[actix_web::test]
    async fn test_safe_request_issues_cookie_and_exposes_token() {
        let app = app!(false);
        let req = test::TestRequest::get().uri("/form").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let cookie = resp
            .response()
            .cookies()
            .find(|c| c.name() == CSRF_COOKIE_NAME)
            .unwrap()
            .into_owned();
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_ne!(cookie.secure(), Some(true));

        let body = test::read_body(resp).await;
        assert_eq!(body, cookie.value().as_bytes());
    }

    #[actix_web::test]
    async fn test_cookie_is_secure_in_production() {
        let app = app!(true);
        let req = test::TestRequest::get().uri("/form").to_request();
        let resp = test::call_service(&app, req).await;

        let cookie = resp
            .response()
            .cookies()
            .find(|c| c.name() == CSRF_COOKIE_NAME)
            .unwrap()
            .into_owned();
        assert_eq!(cookie.secure(), Some(true));
    }

    #[actix_web::test]
    async fn test_existing_cookie_keeps_its_token() {
        let app = app!(false);
        let token = CsrfToken::generate();

        let req = test::TestRequest::get()
            .uri("/form")
            .cookie(Cookie::new(CSRF_COOKIE_NAME, token.as_str().to_string()))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(cookie_token(&resp), token.as_str());
        assert_eq!(test::read_body(resp).await, token.as_str().as_bytes());
    }

    #[actix_web::test]
    async fn test_form_field_token_is_accepted_and_body_restored() {
        let app = app!(false);
        let token = CsrfToken::generate();

        let req = test::TestRequest::post()
            .uri("/form")
            .cookie(Cookie::new(CSRF_COOKIE_NAME, token.as_str().to_string()))
            .insert_header((header::CONTENT_TYPE, "application/x-www-form-urlencoded"))
            .set_payload(format!("note=hello&_csrf={}", token.as_str()))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, "hello");
    }

    #[actix_web::test]
    async fn test_header_token_is_accepted() {
        let app = app!(false);
        let token = CsrfToken::generate();

        let req = test::TestRequest::post()
            .uri("/form")
            .cookie(Cookie::new(CSRF_COOKIE_NAME, token.as_str().to_string()))
            .insert_header((CSRF_HEADER, token.as_str()))
            .set_form([("note", "via header")])
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, "via header");
    }

    #[actix_web::test]
    async fn test_valid_header_wins_over_stale_form_field() {
        let app = app!(false);
        let token = CsrfToken::generate();
        let stale = CsrfToken::generate();

        let req = test::TestRequest::post()
            .uri("/form")
            .cookie(Cookie::new(CSRF_COOKIE_NAME, token.as_str().to_string()))
            .insert_header((CSRF_HEADER, token.as_str()))
            .insert_header((header::CONTENT_TYPE, "application/x-www-form-urlencoded"))
            .set_payload(format!("note=kept&_csrf={}", stale.as_str()))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, "kept");
    }

    #[actix_web::test]
    async fn test_valid_form_field_wins_over_stale_header() {
        let app = app!(false);
        let token = CsrfToken::generate();
        let stale = CsrfToken::generate();

        let req = test::TestRequest::post()
            .uri("/form")
            .cookie(Cookie::new(CSRF_COOKIE_NAME, token.as_str().to_string()))
            .insert_header((CSRF_HEADER, stale.as_str()))
            .insert_header((header::CONTENT_TYPE, "application/x-www-form-urlencoded"))
            .set_payload(format!("note=kept&_csrf={}", token.as_str()))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_stale_form_field_and_header_are_forbidden() {
        let app = app!(false);
        let token = CsrfToken::generate();
        let stale = CsrfToken::generate();

        let req = test::TestRequest::post()
            .uri("/form")
            .cookie(Cookie::new(CSRF_COOKIE_NAME, token.as_str().to_string()))
            .insert_header((CSRF_HEADER, stale.as_str()))
            .insert_header((header::CONTENT_TYPE, "application/x-www-form-urlencoded"))
            .set_payload(format!("note=x&_csrf={}", stale.as_str()))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_mismatched_tokens_are_forbidden() {
        let app = app!(false);
        let token = CsrfToken::generate();
        let foreign = CsrfToken::generate();

        let presented = [None, Some(String::new()), Some(foreign.into_inner())];
        for candidate in presented {
            let mut req = test::TestRequest::post()
                .uri("/form")
                .cookie(Cookie::new(CSRF_COOKIE_NAME, token.as_str().to_string()))
                .insert_header((header::ACCEPT, "application/json"));
            if let Some(candidate) = candidate {
                req = req.insert_header((CSRF_HEADER, candidate));
            }

            let resp = test::call_service(&app, req.set_form([("note", "x")]).to_request()).await;
            assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        }
    }

    #[actix_web::test]
    async fn test_missing_cookie_is_forbidden_even_with_token() {
        let app = app!(false);
        let token = CsrfToken::generate();

        let req = test::TestRequest::post()
            .uri("/form")
            .insert_header((CSRF_HEADER, token.as_str()))
            .set_form([("note", "x")])
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_allow_listed_path_skips_validation() {
        let app = app!(false);
        let req = test::TestRequest::post()
            .uri("/webhook")
            .set_payload("{}")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }
}
