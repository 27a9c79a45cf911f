//! In-flight request tracking.
//!
//! Counts requests currently being handled and refuses new ones once the
//! server starts draining. Admission and the draining flag share one lock,
//! so no request can slip in after the drain has observed an idle server.

use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::sync::Arc;

use actix_web::{
    Error,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use tokio::sync::watch;

use crate::middleware::error::AppError;

#[derive(Debug, Clone, Copy, Default)]
struct Gauge {
    draining: bool,
    in_flight: usize,
}

/// Shared counter of requests being handled.
#[derive(Debug, Clone)]
pub struct InFlightTracker {
    gauge: Arc<watch::Sender<Gauge>>,
}

impl Default for InFlightTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl InFlightTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Gauge::default());
        Self { gauge: Arc::new(tx) }
    }

    /// Admit a request. Returns `None` once draining has started.
    pub fn enter(&self) -> Option<InFlightGuard> {
        let admitted = self.gauge.send_if_modified(|gauge| {
            if gauge.draining {
                return false;
            }
            gauge.in_flight += 1;
            true
        });

        admitted.then(|| InFlightGuard {
            gauge: self.gauge.clone(),
        })
    }

    /// Refuse every request from now on.
    pub fn start_draining(&self) {
        self.gauge.send_modify(|gauge| gauge.draining = true);
    }

    pub fn is_draining(&self) -> bool {
        self.gauge.borrow().draining
    }

    pub fn count(&self) -> usize {
        self.gauge.borrow().in_flight
    }

    /// Resolve once no request is in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.gauge.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|gauge| gauge.in_flight == 0).await;
    }

    pub fn middleware(&self) -> InFlightMiddleware {
        InFlightMiddleware {
            tracker: self.clone(),
        }
    }
}

/// Marks one request as in flight until dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    gauge: Arc<watch::Sender<Gauge>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.gauge
            .send_modify(|gauge| gauge.in_flight = gauge.in_flight.saturating_sub(1));
    }
}

/// Middleware factory that tracks every request through an [`InFlightTracker`].
pub struct InFlightMiddleware {
    tracker: InFlightTracker,
}

impl<S, B> Transform<S, ServiceRequest> for InFlightMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = InFlightService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(InFlightService {
            service,
            tracker: self.tracker.clone(),
        }))
    }
}

pub struct InFlightService<S> {
    service: S,
    tracker: InFlightTracker,
}

impl<S, B> Service<ServiceRequest> for InFlightService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let Some(guard) = self.tracker.enter() else {
            tracing::debug!(path = %req.path(), "Refusing request while draining");
            let refusal = AppError::Unavailable("Server is shutting down".to_string());
            let res: Self::Response = req.error_response(refusal).map_into_right_body();
            return Box::pin(ready(Ok(res)));
        };

        let fut = self.service.call(req);
        Box::pin(async move {
            let result = fut.await;
            drop(guard);
            result.map(|res| res.map_into_left_body())
        })
    }
}
