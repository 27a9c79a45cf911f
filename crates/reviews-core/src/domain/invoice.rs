use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Review;
use crate::error::DomainError;

/// Invoice entity - a billed amount a customer may later review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    /// Total in cents.
    pub total: i32,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    /// Create a new invoice with generated ID and timestamp.
    pub fn new(total: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            total,
            created_at: Utc::now(),
        }
    }
}

/// An invoice joined with its (optional) review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceWithReview {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub review: Option<Review>,
}

/// Parse a decimal amount such as `"12.5"` or `"1,234.56"` into cents.
pub fn parse_total(raw: &str) -> Result<i32, DomainError> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return Err(DomainError::Validation("total is required".to_string()));
    }

    let (whole, fraction) = match cleaned.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (cleaned.as_str(), ""),
    };

    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty())
        || !all_digits(whole)
        || !all_digits(fraction)
        || fraction.len() > 2
    {
        return Err(DomainError::Validation(format!("invalid total: {raw}")));
    }

    let cents = format!("{whole}{fraction:0<2}");
    cents
        .parse::<i32>()
        .map_err(|_| DomainError::Validation(format!("total out of range: {raw}")))
}

/// Format cents as a decimal amount, e.g. `123456` as `"1234.56"`.
pub fn format_total(cents: i32) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}
