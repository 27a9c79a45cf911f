//! Monitoring middleware - one metric sample per request, panics included.

use std::future::{Future, Ready, ready};
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use actix_web::{
    Error,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use futures::FutureExt;
use reviews_core::ports::{MetricsSink, RequestSample};

use super::error::AppError;

/// Label for requests that matched no route.
const UNMATCHED_ROUTE: &str = "unmatched";

/// Monitoring middleware factory. Also the recovery boundary: a panicking
/// handler becomes a 500 instead of a dropped connection.
pub struct Monitoring {
    sink: Arc<dyn MetricsSink>,
}

impl Monitoring {
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Monitoring
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = MonitoringService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MonitoringService {
            service,
            sink: self.sink.clone(),
        }))
    }
}

pub struct MonitoringService<S> {
    service: S,
    sink: Arc<dyn MetricsSink>,
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl<S, B> Service<ServiceRequest> for MonitoringService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let started = Instant::now();
        let route = req
            .match_pattern()
            .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());
        let method = req.method().to_string();
        let sink = self.sink.clone();

        // Panics while building the future are caught as well as while polling it.
        let fut = std::panic::catch_unwind(AssertUnwindSafe(|| self.service.call(req)));

        Box::pin(async move {
            let outcome = match fut {
                Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
                Err(panic) => Err(panic),
            };

            let result = match outcome {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(route = %route, method = %method, panic = %message, "Handler panicked");
                    Err(AppError::Internal(format!("handler panicked: {message}")).into())
                }
            };

            let status = match &result {
                Ok(res) => res.status(),
                Err(e) => e.as_response_error().status_code(),
            };

            sink.record(RequestSample {
                route,
                method,
                status: status.as_u16(),
                duration: started.elapsed(),
                timestamp: chrono::Utc::now(),
            });

            result
        })
    }
}
