//! Ledger store traits
//!
//! Every balance mutation runs inside a [`LedgerTx`]: an atomic unit that
//! either commits all staged writes or none of them.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::mutation::{AccountSelector, ConditionalMutation, LedgerField, MutationOutcome};
use crate::account::{Account, NewAccount, WarehouseRole};
use crate::core_types::AccountId;
use crate::transfer::state::TransferStatus;
use crate::transfer::types::{TransferId, TransferRecord};

/// Storage-level failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Unique key already taken (e.g. wallet address)
    #[error("Duplicate key: {0}")]
    Duplicate(String),

    /// A stored row does not decode into the domain model
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Why a unit did not commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    NotFound(AccountSelector),
    InsufficientBalance {
        account: AccountId,
        field: LedgerField,
    },
    /// Transfer is gone or no longer in `expected`
    TransferMoved {
        transfer_id: TransferId,
        expected: TransferStatus,
    },
    Invariant(String),
}

impl AbortReason {
    /// Map a non-applied mutation outcome; `None` when it applied
    pub fn from_outcome(outcome: &MutationOutcome, selector: &AccountSelector) -> Option<Self> {
        match outcome {
            MutationOutcome::Applied(_) => None,
            MutationOutcome::NotFound => Some(AbortReason::NotFound(selector.clone())),
            MutationOutcome::InsufficientBalance { account, field } => {
                Some(AbortReason::InsufficientBalance {
                    account: *account,
                    field: field.clone(),
                })
            }
            MutationOutcome::InvariantViolation(msg) => Some(AbortReason::Invariant(msg.clone())),
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::NotFound(selector) => write!(f, "{} not found", selector),
            AbortReason::InsufficientBalance { account, field } => {
                write!(f, "insufficient {} on account #{}", field, account)
            }
            AbortReason::TransferMoved {
                transfer_id,
                expected,
            } => write!(f, "transfer {} is no longer {}", transfer_id, expected),
            AbortReason::Invariant(msg) => write!(f, "invariant violation: {}", msg),
        }
    }
}

/// Result of a unit commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome<T> {
    Committed(T),
    Aborted(AbortReason),
}

impl<T> UnitOutcome<T> {
    pub fn is_committed(&self) -> bool {
        matches!(self, UnitOutcome::Committed(_))
    }
}

/// Persistent account, membership and transfer state
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fails with `Duplicate` if the address is taken
    async fn create_account(&self, new: NewAccount) -> Result<Account, StoreError>;

    async fn account(&self, selector: &AccountSelector) -> Result<Option<Account>, StoreError>;

    /// Insert or replace a membership
    async fn set_member(
        &self,
        warehouse: AccountId,
        wallet: AccountId,
        role: WarehouseRole,
    ) -> Result<(), StoreError>;

    async fn role(
        &self,
        warehouse: AccountId,
        wallet: AccountId,
    ) -> Result<Option<WarehouseRole>, StoreError>;

    async fn transfer(&self, id: TransferId) -> Result<Option<TransferRecord>, StoreError>;

    /// Open an atomic unit
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError>;
}

/// One atomic unit of ledger work
///
/// Dropping a tx without `commit` discards it.
#[async_trait]
pub trait LedgerTx: Send {
    /// Read an account as this unit currently sees it
    async fn resolve(&mut self, selector: &AccountSelector) -> Result<Option<Account>, StoreError>;

    async fn apply(&mut self, mutation: &ConditionalMutation) -> Result<MutationOutcome, StoreError>;

    async fn insert_transfer(&mut self, record: &TransferRecord) -> Result<(), StoreError>;

    /// Delete the transfer only if it is still in `expected`
    async fn delete_transfer_if(
        &mut self,
        id: TransferId,
        expected: TransferStatus,
    ) -> Result<Option<TransferRecord>, StoreError>;

    /// Move the transfer `expected -> next`; false on a guard miss
    async fn update_transfer_status_if(
        &mut self,
        id: TransferId,
        expected: TransferStatus,
        next: TransferStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<UnitOutcome<()>, StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
