//! Transfer Engine
//!
//! Peer payments, warehouse deposit/withdraw, treasury grants, collateral
//! adjustment and the warehouse transfer state machine. Every operation
//! runs as one atomic unit against the [`LedgerStore`](crate::ledger::LedgerStore).
//!
//! # Warehouse transfer states
//!
//! ```text
//! PENDING ──advance──▶ SENT ──confirm──▶ (deleted, received)
//!    │                   │
//!  cancel              cancel
//!    ▼                   ▼
//! (deleted)     (deleted, rolled back)
//! ```
//!
//! Each step is guarded by the status it observed; of two concurrent
//! attempts exactly one commits.

pub mod access;
pub mod collateral;
pub mod coordinator;
pub mod payments;
pub mod state;
pub mod types;
pub mod unit;
pub mod webhook;


// Re-exports for convenience
pub use collateral::CollateralService;
pub use coordinator::{CreateTransfer, TransferCoordinator};
pub use payments::{PaymentReceipt, PaymentService, SendRequest, WarehouseMove};
pub use state::TransferStatus;
pub use types::{TransferId, TransferRecord, WarehouseRef};
pub use webhook::{HttpWebhookNotifier, WebhookError, WebhookNotifier, WebhookPayload};
