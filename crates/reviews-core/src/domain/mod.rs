//! Domain entities - the core business objects.

mod invoice;
mod review;

pub use invoice::{Invoice, InvoiceWithReview, format_total, parse_total};
pub use review::Review;
