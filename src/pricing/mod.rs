//! Asset pricing
//!
//! - [`source`]: where prices come from (PostgreSQL table or in-memory)
//! - [`cache`]: process-wide snapshot with per-entry staleness
//! - [`valuation`]: total value and collateral requirement of an asset map

pub mod cache;
pub mod source;
pub mod valuation;

pub use cache::{PriceCache, PriceEntry};
pub use source::{InMemoryPriceSource, PgPriceSource, PriceSource};
pub use valuation::{Valuator, validate_quantities};

use crate::account::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    /// The request names an asset that cannot be priced
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("Price table is empty")]
    EmptySnapshot,

    #[error("Price source error: {0}")]
    Source(String),
}

impl From<sqlx::Error> for PricingError {
    fn from(e: sqlx::Error) -> Self {
        PricingError::Source(e.to_string())
    }
}
