use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Review entity - customer feedback attached to exactly one invoice.
///
/// A review shares its id with the invoice it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn new(invoice_id: Uuid, content: String) -> Self {
        Self {
            id: invoice_id,
            content,
            created_at: Utc::now(),
        }
    }
}
