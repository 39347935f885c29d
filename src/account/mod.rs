//! Account model
//!
//! Wallets and warehouse inventories, plus the validated name types
//! every request goes through.

pub mod models;
pub mod validation;

// Re-export commonly used types
pub use models::{Account, AccountKind, NewAccount, WarehouseRole};
pub use validation::{AssetSymbol, ValidationError, WalletAddress};
