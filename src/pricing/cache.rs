//! Process-wide price cache with staleness control
//!
//! # Protocol
//!
//! For a set of requested symbols:
//!
//! 1. Symbols absent from the snapshot trigger a whole-table reload, but
//!    only if the snapshot itself is older than `snapshot_ttl`. Anything
//!    still absent is an unknown asset.
//! 2. Entries older than `entry_ttl` are refreshed together in one
//!    targeted fetch. An entry the source no longer has is evicted and
//!    reported as an unknown asset.
//!
//! Entries are replaced per key; two valuations refreshing the same
//! symbol race harmlessly (last write wins).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;

use super::PricingError;
use super::source::PriceSource;
use crate::account::{AssetSymbol, ValidationError};
use crate::clock::Clock;
use crate::config::PricingConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceEntry {
    pub value: Decimal,
    pub updated_at: DateTime<Utc>,
}

pub struct PriceCache {
    entries: DashMap<AssetSymbol, PriceEntry>,
    /// Millis since epoch of the last whole-table load
    last_bulk_ms: AtomicI64,
    source: Arc<dyn PriceSource>,
    clock: Arc<dyn Clock>,
    entry_ttl: Duration,
    snapshot_ttl: Duration,
}

impl PriceCache {
    /// Build the cache with its required initial bulk load.
    ///
    /// Fails on an empty price table.
    pub async fn init(
        source: Arc<dyn PriceSource>,
        clock: Arc<dyn Clock>,
        config: &PricingConfig,
    ) -> Result<Self, PricingError> {
        let cache = Self {
            entries: DashMap::new(),
            last_bulk_ms: AtomicI64::new(0),
            source,
            clock,
            entry_ttl: Duration::seconds(config.entry_ttl_secs as i64),
            snapshot_ttl: Duration::seconds(config.snapshot_ttl_secs as i64),
        };

        let loaded = cache.reload_all().await?;
        if loaded == 0 {
            return Err(PricingError::EmptySnapshot);
        }
        tracing::info!(assets = loaded, "Price cache initialized");
        Ok(cache)
    }

    /// Cached value and whether it is stale; no I/O
    pub fn get_value(&self, symbol: &str) -> Option<(Decimal, bool)> {
        let now = self.clock.now();
        self.entries
            .get(symbol)
            .map(|e| (e.value, now - e.updated_at > self.entry_ttl))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn snapshot_is_stale(&self, now: DateTime<Utc>) -> bool {
        let last = self.last_bulk_ms.load(Ordering::Acquire);
        now.timestamp_millis() - last > self.snapshot_ttl.num_milliseconds()
    }

    /// Replace the snapshot with the full table. Returns the entry count.
    pub async fn reload_all(&self) -> Result<usize, PricingError> {
        let prices = self.source.load_all().await?;
        let now = self.clock.now();

        self.entries.retain(|symbol, _| prices.contains_key(symbol));
        for (symbol, value) in prices {
            self.entries.insert(
                symbol,
                PriceEntry {
                    value,
                    updated_at: now,
                },
            );
        }
        self.last_bulk_ms
            .store(now.timestamp_millis(), Ordering::Release);

        tracing::debug!(assets = self.entries.len(), "Price snapshot reloaded");
        Ok(self.entries.len())
    }

    /// Current values for `symbols`, refreshing per the staleness protocol
    pub async fn resolve(
        &self,
        symbols: &[AssetSymbol],
    ) -> Result<HashMap<AssetSymbol, Decimal>, PricingError> {
        let now = self.clock.now();

        let missing: Vec<&AssetSymbol> = symbols
            .iter()
            .filter(|s| !self.entries.contains_key(s.as_str()))
            .collect();
        if !missing.is_empty() {
            if self.snapshot_is_stale(now) {
                tracing::info!(missing = missing.len(), "Unknown asset requested, reloading prices");
                self.reload_all().await?;
            }
            if let Some(unknown) = missing
                .iter()
                .find(|s| !self.entries.contains_key(s.as_str()))
            {
                return Err(ValidationError::UnknownAsset(unknown.to_string()).into());
            }
        }

        let stale: Vec<AssetSymbol> = symbols
            .iter()
            .filter(|s| matches!(self.get_value(s.as_str()), Some((_, true))))
            .cloned()
            .collect();
        if !stale.is_empty() {
            self.refresh(&stale).await?;
        }

        symbols
            .iter()
            .map(|s| {
                self.entries
                    .get(s.as_str())
                    .map(|e| (s.clone(), e.value))
                    .ok_or_else(|| PricingError::from(ValidationError::UnknownAsset(s.to_string())))
            })
            .collect()
    }

    /// One bulk fetch for exactly `stale`
    async fn refresh(&self, stale: &[AssetSymbol]) -> Result<(), PricingError> {
        let fetched = self.source.fetch(stale).await?;
        let now = self.clock.now();

        let mut gone = None;
        for symbol in stale {
            match fetched.get(symbol).copied().flatten() {
                Some(value) => {
                    self.entries.insert(
                        symbol.clone(),
                        PriceEntry {
                            value,
                            updated_at: now,
                        },
                    );
                }
                None => {
                    tracing::warn!(asset = %symbol, "Asset no longer priced, evicting");
                    self.entries.remove(symbol.as_str());
                    gone.get_or_insert_with(|| symbol.clone());
                }
            }
        }

        tracing::debug!(refreshed = stale.len(), "Stale prices refreshed");
        match gone {
            Some(symbol) => Err(ValidationError::UnknownAsset(symbol.to_string()).into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::pricing::source::InMemoryPriceSource;
    use rust_decimal_macros::dec;

    struct Fixture {
        cache: PriceCache,
        source: Arc<InMemoryPriceSource>,
        clock: ManualClock,
    }

    async fn fixture() -> Fixture {
        let source = Arc::new(InMemoryPriceSource::with_prices([
            ("wood", dec!(20)),
            ("gold", dec!(150.5)),
        ]));
        let clock = ManualClock::epoch();
        let cache = PriceCache::init(
            source.clone(),
            Arc::new(clock.clone()),
            &PricingConfig::default(),
        )
        .await
        .unwrap();
        Fixture {
            cache,
            source,
            clock,
        }
    }

    fn sym(s: &str) -> AssetSymbol {
        AssetSymbol::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_init_fails_on_empty_table() {
        let result = PriceCache::init(
            Arc::new(InMemoryPriceSource::new()),
            Arc::new(ManualClock::epoch()),
            &PricingConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(PricingError::EmptySnapshot)));
    }

    #[tokio::test]
    async fn test_get_value_reports_staleness() {
        let f = fixture().await;
        assert_eq!(f.cache.get_value("wood"), Some((dec!(20), false)));
        assert_eq!(f.cache.get_value("iron"), None);

        f.clock.advance(Duration::minutes(31));
        assert_eq!(f.cache.get_value("wood"), Some((dec!(20), true)));
    }

    #[tokio::test]
    async fn test_stale_entry_refreshed_once() {
        let f = fixture().await;
        let wood = [sym("wood")];

        // t=0: fresh, no I/O
        f.cache.resolve(&wood).await.unwrap();
        assert_eq!(f.source.fetch_calls(), 0);

        // t=31m: stale, one refresh picks up the new price
        f.source.set_price(&sym("wood"), dec!(25));
        f.clock.advance(Duration::minutes(31));
        let values = f.cache.resolve(&wood).await.unwrap();
        assert_eq!(values[&sym("wood")], dec!(25));
        assert_eq!(f.source.fetch_calls(), 1);

        // t=32m: refreshed a minute ago, no I/O
        f.clock.advance(Duration::minutes(1));
        f.cache.resolve(&wood).await.unwrap();
        assert_eq!(f.source.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_fetches_only_stale_subset() {
        let f = fixture().await;
        f.clock.advance(Duration::minutes(31));
        // Refresh wood alone; gold stays stale
        f.cache.resolve(&[sym("wood")]).await.unwrap();
        f.clock.advance(Duration::minutes(5));

        f.cache.resolve(&[sym("wood"), sym("gold")]).await.unwrap();
        assert_eq!(f.source.fetch_calls(), 2);
        assert_eq!(f.source.fetched_symbols(), 2);
    }

    #[tokio::test]
    async fn test_unknown_symbol_with_fresh_snapshot() {
        let f = fixture().await;
        f.source.set_price(&sym("iron"), dec!(3));

        let err = f.cache.resolve(&[sym("iron")]).await.unwrap_err();
        assert!(matches!(
            err,
            PricingError::Invalid(ValidationError::UnknownAsset(_))
        ));
        // Snapshot is fresh: no reload attempted
        assert_eq!(f.source.load_calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_symbol_with_old_snapshot_reloads() {
        let f = fixture().await;
        f.source.set_price(&sym("iron"), dec!(3));
        f.clock.advance(Duration::minutes(61));

        let values = f.cache.resolve(&[sym("iron")]).await.unwrap();
        assert_eq!(values[&sym("iron")], dec!(3));
        assert_eq!(f.source.load_calls(), 2);
    }

    #[tokio::test]
    async fn test_removed_asset_is_evicted() {
        let f = fixture().await;
        f.source.remove("gold");
        f.clock.advance(Duration::minutes(31));

        let err = f.cache.resolve(&[sym("gold")]).await.unwrap_err();
        assert!(matches!(
            err,
            PricingError::Invalid(ValidationError::UnknownAsset(_))
        ));
        assert_eq!(f.cache.get_value("gold"), None);
    }

    #[tokio::test]
    async fn test_source_failure_propagates() {
        let f = fixture().await;
        f.source.set_fail(true);
        f.clock.advance(Duration::minutes(31));
        assert!(matches!(
            f.cache.resolve(&[sym("wood")]).await,
            Err(PricingError::Source(_))
        ));
        // Entry kept: a transient failure is not an eviction
        assert!(f.cache.get_value("wood").is_some());
    }
}
