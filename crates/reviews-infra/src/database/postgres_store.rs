//! PostgreSQL transactional store via SeaORM.

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, DatabaseTransaction, DbConn, DbErr, EntityTrait, PaginatorTrait,
    QueryOrder, SqlErr, TransactionTrait,
};
use uuid::Uuid;

use reviews_core::RepoError;
use reviews_core::domain::{Invoice, InvoiceWithReview, Review};
use reviews_core::ports::{InvoiceRepository, ReviewRepository, Transaction, TransactionalStore};

use super::entity::invoice::{self, Entity as InvoiceEntity};
use super::entity::review::{self, Entity as ReviewEntity};

/// Store that opens a database transaction per unit of work.
pub struct PostgresStore {
    db: DbConn,
}

impl PostgresStore {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TransactionalStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, RepoError> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| RepoError::Connection(e.to_string()))?;
        Ok(Box::new(PostgresTransaction { txn }))
    }
}

/// An open database transaction.
///
/// SeaORM rolls the transaction back when it is dropped unresolved.
pub struct PostgresTransaction {
    txn: DatabaseTransaction,
}

fn map_db_err(err: DbErr) -> RepoError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(msg)) => RepoError::Constraint(msg),
        Some(SqlErr::ForeignKeyConstraintViolation(msg)) => RepoError::Constraint(msg),
        _ => match err {
            DbErr::Conn(e) => RepoError::Connection(e.to_string()),
            DbErr::ConnectionAcquire(e) => RepoError::Connection(e.to_string()),
            DbErr::RecordNotFound(_) => RepoError::NotFound,
            other => RepoError::Query(other.to_string()),
        },
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        let this = *self;
        this.txn.commit().await.map_err(map_db_err)
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepoError> {
        let this = *self;
        this.txn.rollback().await.map_err(map_db_err)
    }
}

#[async_trait]
impl InvoiceRepository for PostgresTransaction {
    async fn list_invoices_with_review(&self) -> Result<Vec<InvoiceWithReview>, RepoError> {
        let rows = InvoiceEntity::find()
            .find_also_related(ReviewEntity)
            .order_by_desc(invoice::Column::Created)
            .all(&self.txn)
            .await
            .map_err(map_db_err)?;

        Ok(rows
            .into_iter()
            .map(|(invoice, review)| InvoiceWithReview {
                invoice: invoice.into(),
                review: review.map(Into::into),
            })
            .collect())
    }

    async fn find_invoice(&self, id: Uuid) -> Result<Option<Invoice>, RepoError> {
        let result = InvoiceEntity::find_by_id(id)
            .one(&self.txn)
            .await
            .map_err(map_db_err)?;

        Ok(result.map(Into::into))
    }

    async fn create_invoice(&self, invoice: Invoice) -> Result<Invoice, RepoError> {
        let active_model: invoice::ActiveModel = invoice.into();
        let model = active_model.insert(&self.txn).await.map_err(map_db_err)?;
        Ok(model.into())
    }

    async fn delete_invoice(&self, id: Uuid) -> Result<(), RepoError> {
        let result = InvoiceEntity::delete_by_id(id)
            .exec(&self.txn)
            .await
            .map_err(map_db_err)?;

        if result.rows_affected == 0 {
            return Err(RepoError::NotFound);
        }

        Ok(())
    }

    async fn count_invoices(&self) -> Result<u64, RepoError> {
        InvoiceEntity::find()
            .count(&self.txn)
            .await
            .map_err(map_db_err)
    }
}

#[async_trait]
impl ReviewRepository for PostgresTransaction {
    async fn list_reviews(&self) -> Result<Vec<Review>, RepoError> {
        let result = ReviewEntity::find()
            .order_by_desc(review::Column::Created)
            .all(&self.txn)
            .await
            .map_err(map_db_err)?;

        Ok(result.into_iter().map(Into::into).collect())
    }

    async fn create_review(&self, review: Review) -> Result<Review, RepoError> {
        let active_model: review::ActiveModel = review.into();
        let model = active_model.insert(&self.txn).await.map_err(map_db_err)?;
        Ok(model.into())
    }
}
