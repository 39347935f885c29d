//! Price sources

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use sqlx::PgPool;

use super::PricingError;
use crate::account::AssetSymbol;
use crate::db::SafeRow;

/// External price table
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Every priced asset
    async fn load_all(&self) -> Result<HashMap<AssetSymbol, Decimal>, PricingError>;

    /// Current value of each requested asset; `None` if it no longer exists
    async fn fetch(
        &self,
        symbols: &[AssetSymbol],
    ) -> Result<HashMap<AssetSymbol, Option<Decimal>>, PricingError>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

/// Reads table `asset_prices`
pub struct PgPriceSource {
    pool: PgPool,
}

impl PgPriceSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode(row: &sqlx::postgres::PgRow) -> Option<(AssetSymbol, Decimal)> {
        let asset: String = row.try_get_log("asset")?;
        let value: Decimal = row.try_get_log("value")?;
        match AssetSymbol::new(&asset) {
            Ok(symbol) => Some((symbol, value)),
            Err(e) => {
                tracing::warn!(asset = %asset, error = %e, "Skipping unparseable price row");
                None
            }
        }
    }
}

#[async_trait]
impl PriceSource for PgPriceSource {
    async fn load_all(&self) -> Result<HashMap<AssetSymbol, Decimal>, PricingError> {
        let rows = sqlx::query("SELECT asset, value FROM asset_prices")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().filter_map(Self::decode).collect())
    }

    async fn fetch(
        &self,
        symbols: &[AssetSymbol],
    ) -> Result<HashMap<AssetSymbol, Option<Decimal>>, PricingError> {
        let names: Vec<String> = symbols.iter().map(|s| s.as_str().to_string()).collect();
        let rows = sqlx::query("SELECT asset, value FROM asset_prices WHERE asset = ANY($1)")
            .bind(&names)
            .fetch_all(&self.pool)
            .await?;

        let found: HashMap<AssetSymbol, Decimal> = rows.iter().filter_map(Self::decode).collect();
        Ok(symbols
            .iter()
            .map(|s| (s.clone(), found.get(s).copied()))
            .collect())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Price table held in memory, for development and tests
///
/// Counts calls so refresh behaviour can be asserted.
#[derive(Default)]
pub struct InMemoryPriceSource {
    prices: DashMap<AssetSymbol, Decimal>,
    load_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    fetched_symbols: AtomicUsize,
    fail: AtomicBool,
}

impl InMemoryPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prices<'a>(prices: impl IntoIterator<Item = (&'a str, Decimal)>) -> Self {
        let source = Self::new();
        for (symbol, value) in prices {
            if let Ok(symbol) = AssetSymbol::new(symbol) {
                source.prices.insert(symbol, value);
            }
        }
        source
    }

    pub fn set_price(&self, symbol: &AssetSymbol, value: Decimal) {
        self.prices.insert(symbol.clone(), value);
    }

    pub fn remove(&self, symbol: &str) {
        self.prices.remove(symbol);
    }

    /// Make every call fail with a source error
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Total symbols requested across all fetches
    pub fn fetched_symbols(&self) -> usize {
        self.fetched_symbols.load(Ordering::SeqCst)
    }

    fn check_fail(&self) -> Result<(), PricingError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PricingError::Source("price source unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PriceSource for InMemoryPriceSource {
    async fn load_all(&self) -> Result<HashMap<AssetSymbol, Decimal>, PricingError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        self.check_fail()?;
        Ok(self
            .prices
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect())
    }

    async fn fetch(
        &self,
        symbols: &[AssetSymbol],
    ) -> Result<HashMap<AssetSymbol, Option<Decimal>>, PricingError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetched_symbols
            .fetch_add(symbols.len(), Ordering::SeqCst);
        self.check_fail()?;
        Ok(symbols
            .iter()
            .map(|s| (s.clone(), self.prices.get(s.as_str()).map(|v| *v)))
            .collect())
    }
}
