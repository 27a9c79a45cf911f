//! Middleware modules.

pub mod csrf;
pub mod error;
pub mod monitoring;
pub mod rate_limit;
pub mod security_headers;
