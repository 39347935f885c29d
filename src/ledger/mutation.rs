//! Typed conditional mutations
//!
//! Every balance change in the system is a [`ConditionalMutation`]: a
//! set of signed deltas against one account, optionally conditioned on
//! every touched field staying non-negative. Backends translate it into
//! conditional SQL or apply it to an in-memory row with [`apply_to`].

use std::fmt;

use crate::account::{Account, AccountKind, AssetSymbol};
use crate::core_types::{AccountId, Assets, Quantity};

// ============================================================================
// Fields and selectors
// ============================================================================

/// A numeric column of an account
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LedgerField {
    Asset(AssetSymbol),
    /// Total reserve locked against a warehouse
    Collateral,
    /// Unlocked portion of `Collateral`
    CollateralAvailable,
    /// Collateral a deposit of this asset locked
    DepositLock(AssetSymbol),
}

impl LedgerField {
    /// Fields only a warehouse carries
    pub fn is_collateral(&self) -> bool {
        !matches!(self, LedgerField::Asset(_))
    }
}

impl fmt::Display for LedgerField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerField::Asset(symbol) => write!(f, "{}", symbol),
            LedgerField::Collateral => write!(f, "collateral"),
            LedgerField::CollateralAvailable => write!(f, "collateral_available"),
            LedgerField::DepositLock(symbol) => write!(f, "deposit lock on {}", symbol),
        }
    }
}

/// How a mutation finds its account
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountSelector {
    Id(AccountId),
    /// Wallet by address (a username is its primary wallet's address)
    Address(String),
    /// Wallet with this address AND this owner
    OwnedWallet { address: String, owner: AccountId },
    /// Warehouse inventory by id
    Warehouse(AccountId),
}

impl AccountSelector {
    pub fn matches(&self, account: &Account) -> bool {
        match self {
            AccountSelector::Id(id) => account.id == *id,
            AccountSelector::Address(address) => {
                account.kind == AccountKind::Wallet
                    && account.address.as_deref() == Some(address.as_str())
            }
            AccountSelector::OwnedWallet { address, owner } => {
                account.kind == AccountKind::Wallet
                    && account.address.as_deref() == Some(address.as_str())
                    && account.owner == Some(*owner)
            }
            AccountSelector::Warehouse(id) => {
                account.kind == AccountKind::Warehouse && account.id == *id
            }
        }
    }
}

impl fmt::Display for AccountSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountSelector::Id(id) => write!(f, "account #{}", id),
            AccountSelector::Address(address) => write!(f, "wallet '{}'", address),
            AccountSelector::OwnedWallet { address, owner } => {
                write!(f, "wallet '{}' owned by #{}", address, owner)
            }
            AccountSelector::Warehouse(id) => write!(f, "warehouse #{}", id),
        }
    }
}

// ============================================================================
// ConditionalMutation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDelta {
    pub field: LedgerField,
    pub delta: Quantity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalMutation {
    pub selector: AccountSelector,
    pub deltas: Vec<FieldDelta>,
    /// A decrement below zero is `InsufficientBalance` instead of an
    /// invariant violation
    pub require_sufficient: bool,
}

impl ConditionalMutation {
    pub fn new(selector: AccountSelector) -> Self {
        Self {
            selector,
            deltas: Vec::new(),
            require_sufficient: false,
        }
    }

    pub fn require_sufficient(mut self) -> Self {
        self.require_sufficient = true;
        self
    }

    pub fn delta(mut self, field: LedgerField, delta: Quantity) -> Self {
        self.deltas.push(FieldDelta { field, delta });
        self
    }

    /// Add every quantity in `assets`
    pub fn credit_assets(selector: AccountSelector, assets: &Assets) -> Self {
        assets.iter().fold(Self::new(selector), |m, (symbol, qty)| {
            m.delta(LedgerField::Asset(symbol.clone()), *qty)
        })
    }

    /// Subtract every quantity in `assets`, conditioned on sufficiency
    pub fn debit_assets(selector: AccountSelector, assets: &Assets) -> Self {
        assets
            .iter()
            .fold(Self::new(selector), |m, (symbol, qty)| {
                m.delta(LedgerField::Asset(symbol.clone()), -*qty)
            })
            .require_sufficient()
    }

    /// Lock `amount` of a warehouse's available collateral
    pub fn lock_collateral(warehouse: AccountId, amount: Quantity) -> Self {
        Self::new(AccountSelector::Warehouse(warehouse))
            .delta(LedgerField::CollateralAvailable, -amount)
            .require_sufficient()
    }

    /// Return exactly `amount` previously locked
    pub fn release_collateral(warehouse: AccountId, amount: Quantity) -> Self {
        Self::new(AccountSelector::Warehouse(warehouse))
            .delta(LedgerField::CollateralAvailable, amount)
    }

    /// Lock the sum of `shares` and record each share against its asset
    pub fn lock_for_deposit(warehouse: AccountId, shares: &Assets) -> Self {
        let total = shares.values().sum::<Quantity>();
        shares.iter().fold(
            Self::lock_collateral(warehouse, total),
            |m, (symbol, share)| m.delta(LedgerField::DepositLock(symbol.clone()), *share),
        )
    }

    /// Drop deposit locks by `releases` and return their sum to available
    pub fn release_deposit_locks(warehouse: AccountId, releases: &Assets) -> Self {
        let total = releases.values().sum::<Quantity>();
        releases.iter().fold(
            Self::release_collateral(warehouse, total),
            |m, (symbol, release)| m.delta(LedgerField::DepositLock(symbol.clone()), -*release),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}

/// Result of applying one mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Applied to the account with this id
    Applied(AccountId),
    InsufficientBalance { account: AccountId, field: LedgerField },
    NotFound,
    InvariantViolation(String),
}

// ============================================================================
// In-memory application
// ============================================================================

/// Apply `mutation` to `account` in place, or leave it untouched and
/// report why not.
///
/// The selector is not checked here; callers resolve first.
pub fn apply_to(account: &mut Account, mutation: &ConditionalMutation) -> MutationOutcome {
    let mut next = account.clone();

    for FieldDelta { field, delta } in &mutation.deltas {
        if field.is_collateral() && next.kind != AccountKind::Warehouse {
            return MutationOutcome::InvariantViolation(format!(
                "{} has no {}",
                account.display_name(),
                field
            ));
        }

        let current = match field {
            LedgerField::Asset(symbol) => next.balance(symbol.as_str()),
            LedgerField::Collateral => next.collateral,
            LedgerField::CollateralAvailable => next.collateral_available,
            LedgerField::DepositLock(symbol) => next.deposit_lock(symbol.as_str()),
        };

        let Some(value) = current.checked_add(*delta) else {
            return MutationOutcome::InvariantViolation(format!(
                "{} overflow on {}",
                field,
                account.display_name()
            ));
        };
        if value < 0 {
            return if mutation.require_sufficient {
                MutationOutcome::InsufficientBalance {
                    account: account.id,
                    field: field.clone(),
                }
            } else {
                MutationOutcome::InvariantViolation(format!(
                    "{} of {} would become {}",
                    field,
                    account.display_name(),
                    value
                ))
            };
        }

        match field {
            LedgerField::Asset(symbol) => {
                if value == 0 {
                    next.balances.remove(symbol.as_str());
                } else {
                    next.balances.insert(symbol.clone(), value);
                }
            }
            LedgerField::Collateral => next.collateral = value,
            LedgerField::CollateralAvailable => next.collateral_available = value,
            LedgerField::DepositLock(symbol) => {
                if value == 0 {
                    next.deposit_locks.remove(symbol.as_str());
                } else {
                    next.deposit_locks.insert(symbol.clone(), value);
                }
            }
        }
    }

    if next.collateral_available < 0 || next.collateral_available > next.collateral {
        return MutationOutcome::InvariantViolation(format!(
            "collateral bound broken on {}: available {} of {}",
            account.display_name(),
            next.collateral_available,
            next.collateral
        ));
    }

    *account = next;
    MutationOutcome::Applied(account.id)
}
