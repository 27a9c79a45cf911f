//! # Reviews Web Server
//!
//! Invoices and reviews over HTTP, with the request lifecycle around them:
//! one unit of work per request, rate limiting, CSRF protection, security
//! headers, request metrics and graceful shutdown.

pub mod app;
pub mod config;
pub mod handlers;
pub mod lifecycle;
pub mod middleware;
pub mod observability;
pub mod state;
pub mod telemetry;

pub use app::{AppComponents, build_app};
