//! In-memory transactional store - used as fallback when no database is configured.
//!
//! Writes are staged per transaction and become visible to other
//! transactions only on commit. Commit re-checks the staged writes against
//! the committed tables, so two transactions racing on the same row cannot
//! silently overwrite each other: the later commit fails and applies nothing.
//! Data is lost on process restart.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use reviews_core::RepoError;
use reviews_core::domain::{Invoice, InvoiceWithReview, Review};
use reviews_core::ports::{InvoiceRepository, ReviewRepository, Transaction, TransactionalStore};

#[derive(Debug, Clone, Default)]
struct Tables {
    invoices: BTreeMap<Uuid, Invoice>,
    reviews: BTreeMap<Uuid, Review>,
}

#[derive(Debug, Clone)]
enum Write {
    PutInvoice(Invoice),
    DeleteInvoice(Uuid),
    PutReview(Review),
}

impl Tables {
    fn apply(&mut self, write: &Write) {
        match write {
            Write::PutInvoice(invoice) => {
                self.invoices.insert(invoice.id, invoice.clone());
            }
            Write::DeleteInvoice(id) => {
                self.invoices.remove(id);
                // ON DELETE CASCADE
                self.reviews.remove(id);
            }
            Write::PutReview(review) => {
                self.reviews.insert(review.id, review.clone());
            }
        }
    }
}

impl Tables {
    /// Apply `write` if the committed rows still satisfy its constraints.
    fn try_apply(&mut self, write: &Write) -> Result<(), RepoError> {
        match write {
            Write::PutInvoice(invoice) if self.invoices.contains_key(&invoice.id) => {
                Err(RepoError::Constraint("Invoice already exists".to_string()))
            }
            Write::PutReview(review) if !self.invoices.contains_key(&review.id) => Err(
                RepoError::Constraint("Review must reference an existing invoice".to_string()),
            ),
            Write::PutReview(review) if self.reviews.contains_key(&review.id) => Err(
                RepoError::Constraint("A review already exists for this invoice".to_string()),
            ),
            // Deleting a row another transaction already removed is a no-op.
            _ => {
                self.apply(write);
                Ok(())
            }
        }
    }
}

/// Transactional store backed by process memory.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn committed_invoice_count(&self) -> usize {
        self.tables.read().await.invoices.len()
    }
}

#[async_trait]
impl TransactionalStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, RepoError> {
        Ok(Box::new(InMemoryTransaction {
            tables: self.tables.clone(),
            staged: Mutex::new(Vec::new()),
        }))
    }
}

/// Staged writes over the shared tables. Dropping discards them.
pub struct InMemoryTransaction {
    tables: Arc<RwLock<Tables>>,
    staged: Mutex<Vec<Write>>,
}

impl InMemoryTransaction {
    /// Committed state with this transaction's own writes applied.
    async fn view(&self) -> Tables {
        let mut view = self.tables.read().await.clone();
        for write in self.staged.lock().await.iter() {
            view.apply(write);
        }
        view
    }

    async fn stage(&self, write: Write) {
        self.staged.lock().await.push(write);
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        let this = *self;
        let staged = this.staged.into_inner();
        let mut tables = this.tables.write().await;

        let mut next = tables.clone();
        for write in &staged {
            if let Err(e) = next.try_apply(write) {
                tracing::debug!(error = %e, "In-memory commit conflicted, nothing applied");
                return Err(e);
            }
        }
        *tables = next;

        tracing::debug!(writes = staged.len(), "In-memory transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepoError> {
        tracing::debug!("In-memory transaction rolled back");
        Ok(())
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryTransaction {
    async fn list_invoices_with_review(&self) -> Result<Vec<InvoiceWithReview>, RepoError> {
        let view = self.view().await;
        let mut rows: Vec<InvoiceWithReview> = view
            .invoices
            .values()
            .map(|invoice| InvoiceWithReview {
                invoice: invoice.clone(),
                review: view.reviews.get(&invoice.id).cloned(),
            })
            .collect();
        rows.sort_by(|a, b| b.invoice.created_at.cmp(&a.invoice.created_at));
        Ok(rows)
    }

    async fn find_invoice(&self, id: Uuid) -> Result<Option<Invoice>, RepoError> {
        Ok(self.view().await.invoices.get(&id).cloned())
    }

    async fn create_invoice(&self, invoice: Invoice) -> Result<Invoice, RepoError> {
        if self.view().await.invoices.contains_key(&invoice.id) {
            return Err(RepoError::Constraint("Invoice already exists".to_string()));
        }
        self.stage(Write::PutInvoice(invoice.clone())).await;
        Ok(invoice)
    }

    async fn delete_invoice(&self, id: Uuid) -> Result<(), RepoError> {
        if !self.view().await.invoices.contains_key(&id) {
            return Err(RepoError::NotFound);
        }
        self.stage(Write::DeleteInvoice(id)).await;
        Ok(())
    }

    async fn count_invoices(&self) -> Result<u64, RepoError> {
        Ok(self.view().await.invoices.len() as u64)
    }
}

#[async_trait]
impl ReviewRepository for InMemoryTransaction {
    async fn list_reviews(&self) -> Result<Vec<Review>, RepoError> {
        let mut reviews: Vec<Review> = self.view().await.reviews.into_values().collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reviews)
    }

    async fn create_review(&self, review: Review) -> Result<Review, RepoError> {
        let view = self.view().await;
        if !view.invoices.contains_key(&review.id) {
            return Err(RepoError::Constraint(
                "Review must reference an existing invoice".to_string(),
            ));
        }
        if view.reviews.contains_key(&review.id) {
            return Err(RepoError::Constraint(
                "A review already exists for this invoice".to_string(),
            ));
        }
        self.stage(Write::PutReview(review.clone())).await;
        Ok(review)
    }
}
