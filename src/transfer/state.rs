//! Warehouse transfer FSM states
//!
//! Status ids are stored in PostgreSQL as SMALLINT.
//!
//! ```text
//! PENDING → SENT → (deleted: received)
//!    ↓        ↓
//! (deleted: cancelled, assets and collateral returned)
//! ```
//!
//! Terminal outcomes are deletions, so only the two live states exist.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum TransferStatus {
    /// Created: collateral locked on receiving, assets held in escrow
    Pending = 10,

    /// Sending side has shipped; waiting for the receiving confirmation
    Sent = 20,
}

impl TransferStatus {
    /// Get the numeric status ID for PostgreSQL storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from PostgreSQL status ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            10 => Some(TransferStatus::Pending),
            20 => Some(TransferStatus::Sent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Sent => "SENT",
        }
    }

    /// Next live state, if any. `Sent` leaves the table on confirm.
    pub fn next(&self) -> Option<Self> {
        match self {
            TransferStatus::Pending => Some(TransferStatus::Sent),
            TransferStatus::Sent => None,
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for TransferStatus {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        TransferStatus::from_id(value).ok_or(())
    }
}
