//! Data models for wallets and warehouse inventories

use chrono::{DateTime, Utc};

use crate::core_types::{AccountId, Assets, Quantity};

/// Account kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum AccountKind {
    Wallet = 1,
    Warehouse = 2,
}

impl AccountKind {
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(AccountKind::Wallet),
            2 => Some(AccountKind::Warehouse),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Wallet => "wallet",
            AccountKind::Warehouse => "warehouse",
        }
    }
}

/// Role of a wallet inside a warehouse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum WarehouseRole {
    Owner = 1,
    Worker = 2,
}

impl WarehouseRole {
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(WarehouseRole::Owner),
            2 => Some(WarehouseRole::Worker),
            _ => None,
        }
    }
}

/// A balance-holding account: either a wallet or a warehouse inventory
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub kind: AccountKind,
    /// Wallets only; immutable once assigned
    pub address: Option<String>,
    /// Warehouses only
    pub name: Option<String>,
    /// Custodial wallets are owned by another wallet
    pub owner: Option<AccountId>,
    /// Smart wallets get notified before a credit commits
    pub webhook: Option<String>,
    pub balances: Assets,
    pub collateral: Quantity,
    pub collateral_available: Quantity,
    /// Collateral locked by deposits, per deposited asset (warehouses only)
    pub deposit_locks: Assets,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn is_wallet(&self) -> bool {
        self.kind == AccountKind::Wallet
    }

    pub fn is_warehouse(&self) -> bool {
        self.kind == AccountKind::Warehouse
    }

    pub fn balance(&self, symbol: &str) -> Quantity {
        self.balances.get(symbol).copied().unwrap_or(0)
    }

    /// Collateral currently locked by outstanding transfers and deposits
    pub fn collateral_locked(&self) -> Quantity {
        self.collateral - self.collateral_available
    }

    pub fn deposit_lock(&self, symbol: &str) -> Quantity {
        self.deposit_locks.get(symbol).copied().unwrap_or(0)
    }

    /// Address for wallets, name for warehouses, id as last resort
    pub fn display_name(&self) -> String {
        self.address
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| format!("#{}", self.id))
    }
}

/// Parameters for creating an account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub kind: AccountKind,
    pub address: Option<String>,
    pub name: Option<String>,
    pub owner: Option<AccountId>,
    pub webhook: Option<String>,
}

impl NewAccount {
    pub fn wallet(address: impl Into<String>) -> Self {
        Self {
            kind: AccountKind::Wallet,
            address: Some(address.into()),
            name: None,
            owner: None,
            webhook: None,
        }
    }

    pub fn warehouse(name: impl Into<String>) -> Self {
        Self {
            kind: AccountKind::Warehouse,
            address: None,
            name: Some(name.into()),
            owner: None,
            webhook: None,
        }
    }

    pub fn owned_by(mut self, owner: AccountId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_webhook(mut self, webhook: impl Into<String>) -> Self {
        self.webhook = Some(webhook.into());
        self
    }
}
