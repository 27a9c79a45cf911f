use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Invoice, InvoiceWithReview, Review};
use crate::error::RepoError;

/// Invoice operations available inside a transaction.
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// All invoices, newest first, each with its review if one exists.
    async fn list_invoices_with_review(&self) -> Result<Vec<InvoiceWithReview>, RepoError>;

    async fn find_invoice(&self, id: Uuid) -> Result<Option<Invoice>, RepoError>;

    async fn create_invoice(&self, invoice: Invoice) -> Result<Invoice, RepoError>;

    /// Delete an invoice. Returns `RepoError::NotFound` if nothing was deleted.
    async fn delete_invoice(&self, id: Uuid) -> Result<(), RepoError>;

    async fn count_invoices(&self) -> Result<u64, RepoError>;
}

/// Review operations available inside a transaction.
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// All reviews, newest first.
    async fn list_reviews(&self) -> Result<Vec<Review>, RepoError>;

    /// Create a review. Returns `RepoError::Constraint` if the invoice
    /// already has one.
    async fn create_review(&self, review: Review) -> Result<Review, RepoError>;
}
