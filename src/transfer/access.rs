//! Caller checks shared by the services
//!
//! Callers arrive pre-authenticated as the id of their primary wallet.
//! Business rules (membership, ownership) are re-checked here.

use crate::account::{Account, AccountKind, WarehouseRole};
use crate::core_types::AccountId;
use crate::error::EngineError;
use crate::ledger::{AccountSelector, LedgerStore};

/// The caller's primary wallet, or a wallet the caller owns by address
pub async fn caller_wallet(
    store: &dyn LedgerStore,
    caller: AccountId,
    address: Option<&str>,
) -> Result<Account, EngineError> {
    let primary = store
        .account(&AccountSelector::Id(caller))
        .await?
        .filter(|a| a.kind == AccountKind::Wallet)
        .ok_or_else(|| EngineError::AccountNotFound(format!("account #{}", caller)))?;

    match address {
        None => Ok(primary),
        Some(address) if primary.address.as_deref() == Some(address) => Ok(primary),
        Some(address) => {
            let selector = AccountSelector::OwnedWallet {
                address: address.to_string(),
                owner: caller,
            };
            store
                .account(&selector)
                .await?
                .ok_or_else(|| EngineError::AccountNotFound(selector.to_string()))
        }
    }
}

pub async fn warehouse(store: &dyn LedgerStore, id: AccountId) -> Result<Account, EngineError> {
    store
        .account(&AccountSelector::Warehouse(id))
        .await?
        .ok_or(EngineError::WarehouseNotFound(id))
}

/// Any role in `warehouse`
pub async fn require_member(
    store: &dyn LedgerStore,
    warehouse: AccountId,
    caller: AccountId,
) -> Result<WarehouseRole, EngineError> {
    store.role(warehouse, caller).await?.ok_or_else(|| {
        EngineError::Forbidden(format!("not assigned to warehouse #{}", warehouse))
    })
}

pub async fn require_owner(
    store: &dyn LedgerStore,
    warehouse: AccountId,
    caller: AccountId,
) -> Result<(), EngineError> {
    match require_member(store, warehouse, caller).await? {
        WarehouseRole::Owner => Ok(()),
        WarehouseRole::Worker => Err(EngineError::Forbidden(format!(
            "only the owner of warehouse #{} may do this",
            warehouse
        ))),
    }
}
