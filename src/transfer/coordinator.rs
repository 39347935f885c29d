//! Warehouse Transfer Coordinator
//!
//! Drives the pending -> sent -> received lifecycle. Every step is one
//! atomic unit whose core write is guarded by the status the caller
//! observed, so concurrent attempts on the same transfer exclude each
//! other: exactly one wins, the rest see `TransferNotFound`.

use std::sync::Arc;

use tracing::{debug, info};

use super::access;
use super::state::TransferStatus;
use super::types::{TransferId, TransferRecord, WarehouseRef};
use super::unit;
use crate::account::{Account, ValidationError};
use crate::clock::Clock;
use crate::core_types::{AccountId, Assets};
use crate::error::EngineError;
use crate::ledger::{AccountSelector, ConditionalMutation, LedgerStore};
use crate::pricing::{Valuator, validate_quantities};

/// Request to move inventory from `sending` into `receiving`
#[derive(Debug, Clone)]
pub struct CreateTransfer {
    pub sending: AccountId,
    pub receiving: AccountId,
    pub assets: Assets,
}

pub struct TransferCoordinator {
    store: Arc<dyn LedgerStore>,
    valuator: Arc<Valuator>,
    clock: Arc<dyn Clock>,
}

impl TransferCoordinator {
    pub fn new(store: Arc<dyn LedgerStore>, valuator: Arc<Valuator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            valuator,
            clock,
        }
    }

    /// Create a pending transfer
    ///
    /// The caller must be assigned to the receiving warehouse, which locks
    /// collateral worth the assets while they are in flight.
    pub async fn create(
        &self,
        caller: AccountId,
        req: CreateTransfer,
    ) -> Result<TransferRecord, EngineError> {
        validate_quantities(&req.assets)?;
        if req.sending == req.receiving {
            return Err(ValidationError::SameAccount.into());
        }

        let receiving = access::warehouse(self.store.as_ref(), req.receiving).await?;
        let sending = access::warehouse(self.store.as_ref(), req.sending).await?;
        access::require_member(self.store.as_ref(), receiving.id, caller).await?;

        let needed = self.valuator.collateral_for(&req.assets).await?;
        if receiving.collateral_available < needed {
            return Err(EngineError::InsufficientCollateral(receiving.id));
        }

        let now = self.clock.now();
        let record = TransferRecord {
            transfer_id: TransferId::new(),
            status: TransferStatus::Pending,
            collateral_used: needed,
            sending: warehouse_ref(&sending),
            receiving: warehouse_ref(&receiving),
            assets: req.assets,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.store.begin().await?;
        let result = async {
            unit::apply(
                tx.as_mut(),
                &ConditionalMutation::lock_collateral(receiving.id, needed),
            )
            .await?;
            unit::apply(
                tx.as_mut(),
                &ConditionalMutation::debit_assets(
                    AccountSelector::Warehouse(sending.id),
                    &record.assets,
                ),
            )
            .await?;
            tx.insert_transfer(&record).await?;
            Ok::<_, EngineError>(())
        }
        .await;
        unit::finish(tx, result).await?;

        info!(
            transfer_id = %record.transfer_id,
            sending = sending.id,
            receiving = receiving.id,
            collateral = needed,
            "Transfer created"
        );
        Ok(record)
    }

    /// Cancel a pending or sent transfer
    ///
    /// Pending: either side may cancel. Sent: only the receiving side.
    /// Assets go back to the sender and the receiver's lock is released.
    pub async fn cancel(&self, caller: AccountId, id: TransferId) -> Result<(), EngineError> {
        let record = self.load(id).await?;
        match record.status {
            TransferStatus::Pending => self.require_either_side(&record, caller).await?,
            TransferStatus::Sent => {
                access::require_member(self.store.as_ref(), record.receiving.id, caller).await?;
            }
        }

        let mut tx = self.store.begin().await?;
        let result = async {
            let deleted = tx
                .delete_transfer_if(id, record.status)
                .await?
                .ok_or_else(|| EngineError::TransferNotFound(id.to_string()))?;
            unit::apply(
                tx.as_mut(),
                &ConditionalMutation::credit_assets(
                    AccountSelector::Warehouse(deleted.sending.id),
                    &deleted.assets,
                ),
            )
            .await?;
            unit::apply(
                tx.as_mut(),
                &ConditionalMutation::release_collateral(
                    deleted.receiving.id,
                    deleted.collateral_used,
                ),
            )
            .await?;
            Ok::<_, EngineError>(deleted)
        }
        .await;
        let deleted = unit::finish(tx, result).await?;

        info!(transfer_id = %id, status = %deleted.status, "Transfer cancelled");
        Ok(())
    }

    /// Mark a pending transfer as sent (sending side only)
    pub async fn advance(&self, caller: AccountId, id: TransferId) -> Result<TransferRecord, EngineError> {
        let record = self.load(id).await?;
        access::require_member(self.store.as_ref(), record.sending.id, caller).await?;
        if record.status != TransferStatus::Pending {
            return Err(EngineError::TransferNotFound(id.to_string()));
        }

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = async {
            if tx
                .update_transfer_status_if(id, TransferStatus::Pending, TransferStatus::Sent, now)
                .await?
            {
                Ok(())
            } else {
                Err(EngineError::TransferNotFound(id.to_string()))
            }
        }
        .await;
        unit::finish(tx, result).await?;

        info!(transfer_id = %id, "Transfer sent");
        Ok(TransferRecord {
            status: TransferStatus::Sent,
            updated_at: now,
            ..record
        })
    }

    /// Confirm receipt of a sent transfer (receiving side only)
    ///
    /// The record is deleted, the assets land in the receiving inventory
    /// and the receiver's lock is released.
    pub async fn confirm(&self, caller: AccountId, id: TransferId) -> Result<(), EngineError> {
        let record = self.load(id).await?;
        access::require_member(self.store.as_ref(), record.receiving.id, caller).await?;

        let mut tx = self.store.begin().await?;
        let result = async {
            let deleted = tx
                .delete_transfer_if(id, TransferStatus::Sent)
                .await?
                .ok_or_else(|| EngineError::TransferNotFound(id.to_string()))?;
            unit::apply(
                tx.as_mut(),
                &ConditionalMutation::credit_assets(
                    AccountSelector::Warehouse(deleted.receiving.id),
                    &deleted.assets,
                ),
            )
            .await?;
            unit::apply(
                tx.as_mut(),
                &ConditionalMutation::release_collateral(
                    deleted.receiving.id,
                    deleted.collateral_used,
                ),
            )
            .await?;
            Ok::<_, EngineError>(())
        }
        .await;
        unit::finish(tx, result).await?;

        info!(transfer_id = %id, "Transfer received");
        Ok(())
    }

    /// Read a transfer; members of either side only
    pub async fn get(&self, caller: AccountId, id: TransferId) -> Result<TransferRecord, EngineError> {
        let record = self.load(id).await?;
        self.require_either_side(&record, caller).await?;
        Ok(record)
    }

    async fn load(&self, id: TransferId) -> Result<TransferRecord, EngineError> {
        self.store
            .transfer(id)
            .await?
            .ok_or_else(|| EngineError::TransferNotFound(id.to_string()))
    }

    async fn require_either_side(
        &self,
        record: &TransferRecord,
        caller: AccountId,
    ) -> Result<(), EngineError> {
        for side in [record.sending.id, record.receiving.id] {
            if self.store.role(side, caller).await?.is_some() {
                return Ok(());
            }
        }
        debug!(transfer_id = %record.transfer_id, caller, "Caller on neither side");
        Err(EngineError::Forbidden(format!(
            "not assigned to either side of transfer {}",
            record.transfer_id
        )))
    }
}

fn warehouse_ref(account: &Account) -> WarehouseRef {
    WarehouseRef {
        id: account.id,
        name: account.display_name(),
    }
}
