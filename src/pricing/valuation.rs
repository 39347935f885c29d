//! Asset valuation against the price cache

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::PricingError;
use super::cache::PriceCache;
use crate::account::{AssetSymbol, ValidationError};
use crate::core_types::{Assets, Quantity};

/// Reject an empty map or any non-positive quantity
pub fn validate_quantities(assets: &Assets) -> Result<(), ValidationError> {
    if assets.is_empty() {
        return Err(ValidationError::EmptyAssets);
    }
    match assets.iter().find(|(_, qty)| **qty <= 0) {
        Some((symbol, qty)) => Err(ValidationError::NonPositiveQuantity {
            symbol: symbol.to_string(),
            quantity: *qty,
        }),
        None => Ok(()),
    }
}

pub struct Valuator {
    cache: Arc<PriceCache>,
    /// Valued 1:1, never looked up in the price table
    reserve: AssetSymbol,
}

impl Valuator {
    pub fn new(cache: Arc<PriceCache>, reserve: AssetSymbol) -> Self {
        Self { cache, reserve }
    }

    pub fn reserve_asset(&self) -> &AssetSymbol {
        &self.reserve
    }

    pub fn cache(&self) -> &Arc<PriceCache> {
        &self.cache
    }

    /// Total value of `assets` in reserve units
    pub async fn valuate(
        &self,
        assets: &Assets,
        allow_reserve_asset: bool,
    ) -> Result<Decimal, PricingError> {
        let values = self.values(assets, allow_reserve_asset).await?;
        values
            .values()
            .try_fold(Decimal::ZERO, |total, v| total.checked_add(*v))
            .ok_or_else(|| ValidationError::ValueOverflow.into())
    }

    /// Value of each entry of `assets` in reserve units
    async fn values(
        &self,
        assets: &Assets,
        allow_reserve_asset: bool,
    ) -> Result<BTreeMap<AssetSymbol, Decimal>, PricingError> {
        validate_quantities(assets)?;

        if !allow_reserve_asset && assets.contains_key(self.reserve.as_str()) {
            return Err(ValidationError::ReserveAssetNotAllowed(self.reserve.to_string()).into());
        }

        let priced: Vec<AssetSymbol> = assets
            .keys()
            .filter(|s| **s != self.reserve)
            .cloned()
            .collect();
        let prices = if priced.is_empty() {
            Default::default()
        } else {
            self.cache.resolve(&priced).await?
        };

        let mut values = BTreeMap::new();
        for (symbol, qty) in assets {
            let unit = if *symbol == self.reserve {
                Decimal::ONE
            } else {
                *prices
                    .get(symbol)
                    .ok_or_else(|| ValidationError::UnknownAsset(symbol.to_string()))?
            };
            let value = unit
                .checked_mul(Decimal::from(*qty))
                .ok_or(ValidationError::ValueOverflow)?;
            values.insert(symbol.clone(), value);
        }
        Ok(values)
    }

    /// Integer collateral needed to move `assets`, rounded up
    pub async fn collateral_for(&self, assets: &Assets) -> Result<Quantity, PricingError> {
        let total = self.valuate(assets, false).await?;
        total
            .ceil()
            .to_i64()
            .ok_or_else(|| ValidationError::ValueOverflow.into())
    }

    /// `collateral_for(assets)` split per asset: each asset gets the floor
    /// of its own value and the last one absorbs the rounding, so the
    /// shares sum to exactly the total.
    pub async fn collateral_shares(&self, assets: &Assets) -> Result<Assets, PricingError> {
        let values = self.values(assets, false).await?;
        let total = values
            .values()
            .try_fold(Decimal::ZERO, |total, v| total.checked_add(*v))
            .and_then(|total| total.ceil().to_i64())
            .ok_or(ValidationError::ValueOverflow)?;

        let mut shares = Assets::new();
        let mut assigned: Quantity = 0;
        for (symbol, value) in values {
            let share = value.floor().to_i64().ok_or(ValidationError::ValueOverflow)?;
            assigned += share;
            shares.insert(symbol, share);
        }
        if let Some(last) = shares.values_mut().next_back() {
            *last += total - assigned;
        }
        Ok(shares)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::PricingConfig;
    use crate::pricing::source::InMemoryPriceSource;
    use rust_decimal_macros::dec;

    async fn valuator() -> Valuator {
        let source = Arc::new(InMemoryPriceSource::with_prices([
            ("wood", dec!(20)),
            ("silk", dec!(0.3)),
        ]));
        let cache = PriceCache::init(
            source,
            Arc::new(ManualClock::epoch()),
            &PricingConfig::default(),
        )
        .await
        .unwrap();
        Valuator::new(Arc::new(cache), AssetSymbol::new("stelo").unwrap())
    }

    fn assets(pairs: &[(&str, i64)]) -> Assets {
        pairs
            .iter()
            .map(|(s, q)| (AssetSymbol::new(s).unwrap(), *q))
            .collect()
    }

    #[tokio::test]
    async fn test_valuate_sums_value_times_quantity() {
        let v = valuator().await;
        let total = v
            .valuate(&assets(&[("wood", 10), ("silk", 5)]), false)
            .await
            .unwrap();
        assert_eq!(total, dec!(201.5));
    }

    #[tokio::test]
    async fn test_reserve_asset_rules() {
        let v = valuator().await;
        let with_reserve = assets(&[("stelo", 7), ("wood", 1)]);

        assert_eq!(v.valuate(&with_reserve, true).await.unwrap(), dec!(27));
        assert!(matches!(
            v.valuate(&with_reserve, false).await,
            Err(PricingError::Invalid(ValidationError::ReserveAssetNotAllowed(_)))
        ));
    }

    #[tokio::test]
    async fn test_invalid_quantities() {
        let v = valuator().await;
        assert!(matches!(
            v.valuate(&Assets::new(), true).await,
            Err(PricingError::Invalid(ValidationError::EmptyAssets))
        ));
        assert!(matches!(
            v.valuate(&assets(&[("wood", 0)]), true).await,
            Err(PricingError::Invalid(ValidationError::NonPositiveQuantity { .. }))
        ));
        assert!(matches!(
            v.valuate(&assets(&[("wood", -3)]), true).await,
            Err(PricingError::Invalid(ValidationError::NonPositiveQuantity { .. }))
        ));
    }

    #[tokio::test]
    async fn test_unknown_asset_is_invalid() {
        let v = valuator().await;
        assert!(matches!(
            v.valuate(&assets(&[("unobtainium", 1)]), true).await,
            Err(PricingError::Invalid(ValidationError::UnknownAsset(_)))
        ));
    }

    #[tokio::test]
    async fn test_collateral_rounds_up() {
        let v = valuator().await;
        // 0.3 * 5 = 1.5 -> 2
        assert_eq!(v.collateral_for(&assets(&[("silk", 5)])).await.unwrap(), 2);
        assert_eq!(v.collateral_for(&assets(&[("wood", 10)])).await.unwrap(), 200);
    }

    #[tokio::test]
    async fn test_collateral_shares_sum_to_collateral_for() {
        let v = valuator().await;
        let moved = assets(&[("wood", 10), ("silk", 11)]);

        // 200 + 3.3 rounds up to 204; silk keeps its floor of 3
        assert_eq!(v.collateral_for(&moved).await.unwrap(), 204);
        assert_eq!(
            v.collateral_shares(&moved).await.unwrap(),
            assets(&[("silk", 3), ("wood", 201)])
        );
        assert_eq!(
            v.collateral_shares(&assets(&[("silk", 1)])).await.unwrap(),
            assets(&[("silk", 1)])
        );
        assert!(matches!(
            v.collateral_shares(&assets(&[("stelo", 1)])).await,
            Err(PricingError::Invalid(ValidationError::ReserveAssetNotAllowed(_)))
        ));
    }
}
