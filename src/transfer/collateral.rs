//! Warehouse collateral adjustment
//!
//! Collateral is funded from the owner's reserve-asset balance. Raising
//! it credits both `collateral` and `collateral_available`; lowering it
//! debits both, checked against what is still available, so
//! `collateral - collateral_available` keeps matching the outstanding
//! locks.

use std::sync::Arc;

use tracing::info;

use super::access;
use super::unit;
use crate::account::{Account, AssetSymbol, ValidationError};
use crate::core_types::{AccountId, Quantity};
use crate::error::EngineError;
use crate::ledger::{AccountSelector, ConditionalMutation, LedgerField, LedgerStore};

pub struct CollateralService {
    store: Arc<dyn LedgerStore>,
    reserve: AssetSymbol,
}

impl CollateralService {
    pub fn new(store: Arc<dyn LedgerStore>, reserve: AssetSymbol) -> Self {
        Self { store, reserve }
    }

    /// Raise (positive) or lower (negative) a warehouse's collateral
    ///
    /// Owner only. Returns the warehouse as committed.
    pub async fn adjust(
        &self,
        caller: AccountId,
        warehouse: AccountId,
        amount: Quantity,
    ) -> Result<Account, EngineError> {
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        let magnitude = amount
            .checked_abs()
            .ok_or(ValidationError::ValueOverflow)?;

        let target = access::warehouse(self.store.as_ref(), warehouse).await?;
        access::require_owner(self.store.as_ref(), target.id, caller).await?;

        let wallet = AccountSelector::Id(caller);
        let reserve = LedgerField::Asset(self.reserve.clone());
        let (debit, credit) = if amount > 0 {
            (
                ConditionalMutation::new(wallet)
                    .delta(reserve, -magnitude)
                    .require_sufficient(),
                ConditionalMutation::new(AccountSelector::Warehouse(target.id))
                    .delta(LedgerField::Collateral, magnitude)
                    .delta(LedgerField::CollateralAvailable, magnitude),
            )
        } else {
            (
                ConditionalMutation::new(AccountSelector::Warehouse(target.id))
                    .delta(LedgerField::CollateralAvailable, -magnitude)
                    .delta(LedgerField::Collateral, -magnitude)
                    .require_sufficient(),
                ConditionalMutation::new(wallet).delta(reserve, magnitude),
            )
        };

        let mut tx = self.store.begin().await?;
        let result = async {
            unit::apply(tx.as_mut(), &debit).await?;
            unit::apply(tx.as_mut(), &credit).await?;
            tx.resolve(&AccountSelector::Warehouse(target.id))
                .await?
                .ok_or(EngineError::WarehouseNotFound(target.id))
        }
        .await;
        let updated = unit::finish(tx, result).await?;

        info!(
            warehouse = updated.id,
            amount,
            collateral = updated.collateral,
            available = updated.collateral_available,
            "Collateral adjusted"
        );
        Ok(updated)
    }
}
