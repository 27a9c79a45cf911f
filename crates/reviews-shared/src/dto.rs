//! Data Transfer Objects - form bodies and page payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `POST /invoices` form body. `total` is a decimal amount such as `"1,234.50"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceForm {
    pub total: String,
}

/// `POST /reviews` form body. `id` is the reviewed invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewForm {
    pub id: Uuid,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceResponse {
    pub id: Uuid,
    /// Amount in cents.
    pub total: i32,
    /// Amount formatted for display, e.g. `"1234.50"`.
    pub total_display: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewResponse>,
}

/// A list page plus the anti-forgery token its forms must echo back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub csrf_token: String,
}

/// Payload of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverviewResponse {
    pub invoice_count: u64,
    pub invoices: Vec<InvoiceResponse>,
    pub csrf_token: String,
}

/// Payload of `DELETE /invoices/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteInvoiceResponse {
    /// Invoices left after the delete; `0` means the list is now empty.
    pub remaining: u64,
}
