//! In-memory ledger backend
//!
//! Optimistic units: each [`MemoryTx`] stages its writes against a
//! private overlay, then `commit` replays every staged write against the
//! current shared state under one short lock. A write that no longer
//! holds (someone else spent the balance, advanced the transfer, ...)
//! aborts the whole unit. No lock is held between staged calls.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::mutation::{AccountSelector, ConditionalMutation, MutationOutcome, apply_to};
use super::store::{AbortReason, LedgerStore, LedgerTx, StoreError, UnitOutcome};
use crate::account::{Account, NewAccount, WarehouseRole};
use crate::clock::{Clock, SystemClock};
use crate::core_types::{AccountId, Assets};
use crate::transfer::state::TransferStatus;
use crate::transfer::types::{TransferId, TransferRecord};

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<AccountId, Account>,
    by_address: HashMap<String, AccountId>,
    members: HashMap<(AccountId, AccountId), WarehouseRole>,
    transfers: HashMap<TransferId, TransferRecord>,
    next_id: AccountId,
}

impl LedgerState {
    fn find_id(&self, selector: &AccountSelector) -> Option<AccountId> {
        let id = match selector {
            AccountSelector::Id(id) | AccountSelector::Warehouse(id) => *id,
            AccountSelector::Address(address) | AccountSelector::OwnedWallet { address, .. } => {
                *self.by_address.get(address)?
            }
        };
        self.accounts
            .get(&id)
            .filter(|account| selector.matches(account))
            .map(|account| account.id)
    }
}

#[derive(Debug, Clone)]
enum StagedOp {
    Apply {
        account: AccountId,
        mutation: ConditionalMutation,
    },
    InsertTransfer(TransferRecord),
    DeleteTransfer {
        id: TransferId,
        expected: TransferStatus,
    },
    UpdateStatus {
        id: TransferId,
        expected: TransferStatus,
        next: TransferStatus,
        at: DateTime<Utc>,
    },
}

/// Copy-on-write view over `LedgerState`
#[derive(Debug, Default)]
struct Overlay {
    accounts: HashMap<AccountId, Account>,
    /// `None` marks a deletion
    transfers: HashMap<TransferId, Option<TransferRecord>>,
}

impl Overlay {
    fn account(&self, state: &LedgerState, id: AccountId) -> Option<Account> {
        self.accounts
            .get(&id)
            .or_else(|| state.accounts.get(&id))
            .cloned()
    }

    fn transfer(&self, state: &LedgerState, id: TransferId) -> Option<TransferRecord> {
        match self.transfers.get(&id) {
            Some(entry) => entry.clone(),
            None => state.transfers.get(&id).cloned(),
        }
    }

    fn apply(
        &mut self,
        state: &LedgerState,
        id: AccountId,
        mutation: &ConditionalMutation,
    ) -> MutationOutcome {
        let Some(mut account) = self.account(state, id) else {
            return MutationOutcome::NotFound;
        };
        let outcome = apply_to(&mut account, mutation);
        if matches!(outcome, MutationOutcome::Applied(_)) {
            self.accounts.insert(id, account);
        }
        outcome
    }

    fn delete_transfer_if(
        &mut self,
        state: &LedgerState,
        id: TransferId,
        expected: TransferStatus,
    ) -> Option<TransferRecord> {
        let record = self.transfer(state, id).filter(|t| t.status == expected)?;
        self.transfers.insert(id, None);
        Some(record)
    }

    fn update_status_if(
        &mut self,
        state: &LedgerState,
        id: TransferId,
        expected: TransferStatus,
        next: TransferStatus,
        at: DateTime<Utc>,
    ) -> bool {
        let Some(mut record) = self.transfer(state, id).filter(|t| t.status == expected) else {
            return false;
        };
        record.status = next;
        record.updated_at = at;
        self.transfers.insert(id, Some(record));
        true
    }

    /// Re-run one staged op; any miss aborts the unit
    fn replay(&mut self, state: &LedgerState, op: &StagedOp) -> Result<(), AbortReason> {
        match op {
            StagedOp::Apply { account, mutation } => {
                let outcome = self.apply(state, *account, mutation);
                match AbortReason::from_outcome(&outcome, &AccountSelector::Id(*account)) {
                    Some(reason) => Err(reason),
                    None => Ok(()),
                }
            }
            StagedOp::InsertTransfer(record) => {
                if self.transfer(state, record.transfer_id).is_some() {
                    return Err(AbortReason::Invariant(format!(
                        "transfer {} already exists",
                        record.transfer_id
                    )));
                }
                self.transfers
                    .insert(record.transfer_id, Some(record.clone()));
                Ok(())
            }
            StagedOp::DeleteTransfer { id, expected } => self
                .delete_transfer_if(state, *id, *expected)
                .map(|_| ())
                .ok_or(AbortReason::TransferMoved {
                    transfer_id: *id,
                    expected: *expected,
                }),
            StagedOp::UpdateStatus {
                id,
                expected,
                next,
                at,
            } => {
                if self.update_status_if(state, *id, *expected, *next, *at) {
                    Ok(())
                } else {
                    Err(AbortReason::TransferMoved {
                        transfer_id: *id,
                        expected: *expected,
                    })
                }
            }
        }
    }

    fn write_back(self, state: &mut LedgerState) {
        state.accounts.extend(self.accounts);
        for (id, entry) in self.transfers {
            match entry {
                Some(record) => {
                    state.transfers.insert(id, record);
                }
                None => {
                    state.transfers.remove(&id);
                }
            }
        }
    }
}

// ============================================================================
// MemoryLedger
// ============================================================================

/// Shared in-memory ledger; cheap to clone
#[derive(Clone)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState::default())),
            clock,
        }
    }

    /// Every account, ordered by id
    #[cfg(test)]
    pub async fn accounts(&self) -> Vec<Account> {
        let state = self.state.lock().await;
        let mut accounts: Vec<Account> = state.accounts.values().cloned().collect();
        accounts.sort_by_key(|a| a.id);
        accounts
    }

    #[cfg(test)]
    pub async fn transfers(&self) -> Vec<TransferRecord> {
        let state = self.state.lock().await;
        let mut transfers: Vec<TransferRecord> = state.transfers.values().cloned().collect();
        transfers.sort_by_key(|t| t.transfer_id);
        transfers
    }

    /// Sum of all balances plus assets held in live transfers
    pub async fn total_supply(&self) -> Assets {
        let state = self.state.lock().await;
        let mut total = Assets::new();
        let held = state
            .accounts
            .values()
            .map(|a| &a.balances)
            .chain(state.transfers.values().map(|t| &t.assets));
        for assets in held {
            for (symbol, qty) in assets {
                *total.entry(symbol.clone()).or_insert(0) += qty;
            }
        }
        total
    }

    /// Seed a balance outside of any unit (tests and bootstrap only)
    pub async fn seed(&self, mutation: ConditionalMutation) -> MutationOutcome {
        let mut state = self.state.lock().await;
        let Some(id) = state.find_id(&mutation.selector) else {
            return MutationOutcome::NotFound;
        };
        let Some(account) = state.accounts.get_mut(&id) else {
            return MutationOutcome::NotFound;
        };
        apply_to(account, &mutation)
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn create_account(&self, new: NewAccount) -> Result<Account, StoreError> {
        let mut state = self.state.lock().await;

        if let Some(address) = &new.address
            && state.by_address.contains_key(address)
        {
            return Err(StoreError::Duplicate(format!("address '{}'", address)));
        }

        state.next_id += 1;
        let account = Account {
            id: state.next_id,
            kind: new.kind,
            address: new.address,
            name: new.name,
            owner: new.owner,
            webhook: new.webhook,
            balances: Assets::new(),
            collateral: 0,
            collateral_available: 0,
            deposit_locks: Assets::new(),
            created_at: self.clock.now(),
        };

        if let Some(address) = &account.address {
            state.by_address.insert(address.clone(), account.id);
        }
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn account(&self, selector: &AccountSelector) -> Result<Option<Account>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .find_id(selector)
            .and_then(|id| state.accounts.get(&id).cloned()))
    }

    async fn set_member(
        &self,
        warehouse: AccountId,
        wallet: AccountId,
        role: WarehouseRole,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.members.insert((warehouse, wallet), role);
        Ok(())
    }

    async fn role(
        &self,
        warehouse: AccountId,
        wallet: AccountId,
    ) -> Result<Option<WarehouseRole>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.members.get(&(warehouse, wallet)).copied())
    }

    async fn transfer(&self, id: TransferId) -> Result<Option<TransferRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.transfers.get(&id).cloned())
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        Ok(Box::new(MemoryTx {
            state: self.state.clone(),
            overlay: Overlay::default(),
            ops: Vec::new(),
        }))
    }
}

// ============================================================================
// MemoryTx
// ============================================================================

pub struct MemoryTx {
    state: Arc<Mutex<LedgerState>>,
    overlay: Overlay,
    /// Successful staged writes, in order
    ops: Vec<StagedOp>,
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn resolve(&mut self, selector: &AccountSelector) -> Result<Option<Account>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .find_id(selector)
            .and_then(|id| self.overlay.account(&state, id)))
    }

    async fn apply(&mut self, mutation: &ConditionalMutation) -> Result<MutationOutcome, StoreError> {
        let state = self.state.lock().await;
        let Some(id) = state.find_id(&mutation.selector) else {
            return Ok(MutationOutcome::NotFound);
        };
        let outcome = self.overlay.apply(&state, id, mutation);
        if matches!(outcome, MutationOutcome::Applied(_)) {
            self.ops.push(StagedOp::Apply {
                account: id,
                mutation: mutation.clone(),
            });
        }
        Ok(outcome)
    }

    async fn insert_transfer(&mut self, record: &TransferRecord) -> Result<(), StoreError> {
        let state = self.state.lock().await;
        if self.overlay.transfer(&state, record.transfer_id).is_some() {
            return Err(StoreError::Duplicate(format!(
                "transfer {}",
                record.transfer_id
            )));
        }
        self.overlay
            .transfers
            .insert(record.transfer_id, Some(record.clone()));
        self.ops.push(StagedOp::InsertTransfer(record.clone()));
        Ok(())
    }

    async fn delete_transfer_if(
        &mut self,
        id: TransferId,
        expected: TransferStatus,
    ) -> Result<Option<TransferRecord>, StoreError> {
        let state = self.state.lock().await;
        let deleted = self.overlay.delete_transfer_if(&state, id, expected);
        if deleted.is_some() {
            self.ops.push(StagedOp::DeleteTransfer { id, expected });
        }
        Ok(deleted)
    }

    async fn update_transfer_status_if(
        &mut self,
        id: TransferId,
        expected: TransferStatus,
        next: TransferStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let state = self.state.lock().await;
        let updated = self.overlay.update_status_if(&state, id, expected, next, at);
        if updated {
            self.ops.push(StagedOp::UpdateStatus {
                id,
                expected,
                next,
                at,
            });
        }
        Ok(updated)
    }

    async fn commit(self: Box<Self>) -> Result<UnitOutcome<()>, StoreError> {
        let mut state = self.state.lock().await;

        let mut replay = Overlay::default();
        for op in &self.ops {
            if let Err(reason) = replay.replay(&state, op) {
                tracing::debug!(%reason, "Memory unit aborted at commit");
                return Ok(UnitOutcome::Aborted(reason));
            }
        }

        replay.write_back(&mut state);
        Ok(UnitOutcome::Committed(()))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AssetSymbol;
    use crate::ledger::mutation::LedgerField;
    use crate::transfer::types::WarehouseRef;

    fn assets(pairs: &[(&str, i64)]) -> Assets {
        pairs
            .iter()
            .map(|(s, q)| (AssetSymbol::new(s).unwrap(), *q))
            .collect()
    }

    async fn ledger_with_alice(gold: i64) -> (MemoryLedger, Account) {
        let ledger = MemoryLedger::default();
        let alice = ledger
            .create_account(NewAccount::wallet("alice"))
            .await
            .unwrap();
        ledger
            .seed(ConditionalMutation::credit_assets(
                AccountSelector::Id(alice.id),
                &assets(&[("gold", gold)]),
            ))
            .await;
        (ledger, alice)
    }

    #[tokio::test]
    async fn test_duplicate_address_rejected() {
        let ledger = MemoryLedger::default();
        ledger
            .create_account(NewAccount::wallet("alice"))
            .await
            .unwrap();
        let err = ledger
            .create_account(NewAccount::wallet("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_commit_publishes_and_drop_discards() {
        let (ledger, alice) = ledger_with_alice(10).await;
        let debit = ConditionalMutation::debit_assets(
            AccountSelector::Id(alice.id),
            &assets(&[("gold", 4)]),
        );

        // Rolled back: nothing visible
        let mut tx = ledger.begin().await.unwrap();
        assert_eq!(tx.apply(&debit).await.unwrap(), MutationOutcome::Applied(alice.id));
        tx.rollback().await.unwrap();
        let seen = ledger.account(&AccountSelector::Id(alice.id)).await.unwrap();
        assert_eq!(seen.unwrap().balance("gold"), 10);

        // Staged writes are visible inside the unit only
        let mut tx = ledger.begin().await.unwrap();
        tx.apply(&debit).await.unwrap();
        let inside = tx.resolve(&AccountSelector::Id(alice.id)).await.unwrap();
        assert_eq!(inside.unwrap().balance("gold"), 6);
        let outside = ledger.account(&AccountSelector::Id(alice.id)).await.unwrap();
        assert_eq!(outside.unwrap().balance("gold"), 10);

        assert!(tx.commit().await.unwrap().is_committed());
        let after = ledger.account(&AccountSelector::Id(alice.id)).await.unwrap();
        assert_eq!(after.unwrap().balance("gold"), 6);
    }

    #[tokio::test]
    async fn test_concurrent_spend_second_commit_aborts() {
        let (ledger, alice) = ledger_with_alice(10).await;
        let debit = ConditionalMutation::debit_assets(
            AccountSelector::Id(alice.id),
            &assets(&[("gold", 7)]),
        );

        let mut first = ledger.begin().await.unwrap();
        let mut second = ledger.begin().await.unwrap();
        assert!(matches!(first.apply(&debit).await.unwrap(), MutationOutcome::Applied(_)));
        assert!(matches!(second.apply(&debit).await.unwrap(), MutationOutcome::Applied(_)));

        assert!(first.commit().await.unwrap().is_committed());
        let outcome = second.commit().await.unwrap();
        assert_eq!(
            outcome,
            UnitOutcome::Aborted(AbortReason::InsufficientBalance {
                account: alice.id,
                field: LedgerField::Asset(AssetSymbol::new("gold").unwrap()),
            })
        );

        let after = ledger.account(&AccountSelector::Id(alice.id)).await.unwrap();
        assert_eq!(after.unwrap().balance("gold"), 3);
    }

    #[tokio::test]
    async fn test_status_guard_is_exclusive() {
        let ledger = MemoryLedger::default();
        let now = Utc::now();
        let record = TransferRecord {
            transfer_id: TransferId::new(),
            status: TransferStatus::Pending,
            collateral_used: 0,
            sending: WarehouseRef {
                id: 1,
                name: "a".into(),
            },
            receiving: WarehouseRef {
                id: 2,
                name: "b".into(),
            },
            assets: assets(&[("wood", 1)]),
            created_at: now,
            updated_at: now,
        };
        let id = record.transfer_id;

        let mut tx = ledger.begin().await.unwrap();
        tx.insert_transfer(&record).await.unwrap();
        assert!(tx.commit().await.unwrap().is_committed());

        let mut a = ledger.begin().await.unwrap();
        let mut b = ledger.begin().await.unwrap();
        let (pending, sent) = (TransferStatus::Pending, TransferStatus::Sent);
        assert!(a.update_transfer_status_if(id, pending, sent, now).await.unwrap());
        assert!(b.update_transfer_status_if(id, pending, sent, now).await.unwrap());

        assert!(a.commit().await.unwrap().is_committed());
        assert!(matches!(
            b.commit().await.unwrap(),
            UnitOutcome::Aborted(AbortReason::TransferMoved { .. })
        ));

        let stored = ledger.transfer(id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransferStatus::Sent);

        // Guard miss inside a unit is reported, not staged
        let mut tx = ledger.begin().await.unwrap();
        assert!(
            tx.delete_transfer_if(id, TransferStatus::Pending)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            tx.delete_transfer_if(id, TransferStatus::Sent)
                .await
                .unwrap()
                .is_some()
        );
        assert!(tx.commit().await.unwrap().is_committed());
        assert!(ledger.transfer(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_membership() {
        let ledger = MemoryLedger::default();
        ledger.set_member(10, 1, WarehouseRole::Owner).await.unwrap();
        assert_eq!(
            ledger.role(10, 1).await.unwrap(),
            Some(WarehouseRole::Owner)
        );
        assert_eq!(ledger.role(10, 2).await.unwrap(), None);
    }
}
