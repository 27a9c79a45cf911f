//! SeaORM entities.

pub mod invoice;
pub mod review;
