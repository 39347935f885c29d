//! Transfer record types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::TransferStatus;
use crate::core_types::{AccountId, Assets, Quantity};

/// Warehouse transfer ID (ULID-based)
///
/// Lexicographically sortable by creation time; stored as its 26-char
/// Crockford base32 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransferId(ulid::Ulid);

impl TransferId {
    /// Generate a new unique TransferId
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransferId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// One side of a warehouse transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseRef {
    pub id: AccountId,
    pub name: String,
}

/// A live warehouse transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub transfer_id: TransferId,
    pub status: TransferStatus,
    /// Locked from the receiving warehouse at creation
    pub collateral_used: Quantity,
    pub sending: WarehouseRef,
    pub receiving: WarehouseRef,
    pub assets: Assets,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransferRecord {
    /// Either side
    pub fn involves(&self, warehouse: AccountId) -> bool {
        self.sending.id == warehouse || self.receiving.id == warehouse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_id_unique_and_parseable() {
        let a = TransferId::new();
        let b = TransferId::new();
        assert_ne!(a, b);

        let s = a.to_string();
        assert_eq!(s.len(), 26);
        assert_eq!(s.parse::<TransferId>().unwrap(), a);
        assert!("not-a-ulid".parse::<TransferId>().is_err());
    }
}
