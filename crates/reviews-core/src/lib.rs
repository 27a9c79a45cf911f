//! # Reviews Core
//!
//! The domain layer of the reviews service.
//! This crate contains entities, the error taxonomy, and the ports that
//! infrastructure must implement. It has zero infrastructure dependencies.

pub mod domain;
pub mod error;
pub mod ports;

pub use error::{DomainError, RepoError, UnitOfWorkError};
