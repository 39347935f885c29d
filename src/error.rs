//! Engine error types
//!
//! Every operation on the engine fails with one [`EngineError`]. Codes
//! are stable strings for API responses.

use thiserror::Error;

use crate::account::ValidationError;
use crate::core_types::AccountId;
use crate::ledger::{AbortReason, AccountSelector, LedgerField, StoreError};
use crate::pricing::PricingError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    // === Validation Errors ===
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Address already taken: {0}")]
    AddressTaken(String),

    // === Not Found ===
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Warehouse not found: {0}")]
    WarehouseNotFound(AccountId),

    #[error("Transfer not found or already advanced: {0}")]
    TransferNotFound(String),

    // === Business Rule Errors ===
    #[error("Insufficient balance of {0}")]
    InsufficientBalance(String),

    #[error("Insufficient collateral on warehouse #{0}")]
    InsufficientCollateral(AccountId),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // === External ===
    #[error("Webhook notification failed: {0}")]
    WebhookFailed(String),

    #[error("Price source error: {0}")]
    PriceSource(String),

    // === System Errors ===
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl EngineError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::AddressTaken(_) => "ADDRESS_TAKEN",
            EngineError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            EngineError::WarehouseNotFound(_) => "WAREHOUSE_NOT_FOUND",
            EngineError::TransferNotFound(_) => "TRANSFER_NOT_FOUND",
            EngineError::InsufficientBalance(_) => "INSUFFICIENT_BALANCE",
            EngineError::InsufficientCollateral(_) => "INSUFFICIENT_COLLATERAL",
            EngineError::Forbidden(_) => "FORBIDDEN",
            EngineError::WebhookFailed(_) => "WEBHOOK_FAILED",
            EngineError::PriceSource(_) => "PRICE_SOURCE_ERROR",
            EngineError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            EngineError::Store(_) => "STORE_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            EngineError::Validation(_) => 400,
            EngineError::Forbidden(_) => 403,
            EngineError::AccountNotFound(_)
            | EngineError::WarehouseNotFound(_)
            | EngineError::TransferNotFound(_) => 404,
            EngineError::AddressTaken(_) => 409,
            EngineError::InsufficientBalance(_) | EngineError::InsufficientCollateral(_) => 422,
            EngineError::WebhookFailed(_) => 502,
            EngineError::PriceSource(_) | EngineError::Store(_) => 503,
            EngineError::InvariantViolation(_) => 500,
        }
    }

    /// Transient failures a client may retry as-is
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::WebhookFailed(_) | EngineError::PriceSource(_) | EngineError::Store(_)
        )
    }

    /// Error for a non-applied mutation against `selector`
    pub(crate) fn not_found(selector: &AccountSelector) -> Self {
        match selector {
            AccountSelector::Warehouse(id) => EngineError::WarehouseNotFound(*id),
            other => EngineError::AccountNotFound(other.to_string()),
        }
    }

    pub(crate) fn insufficient(account: AccountId, field: &LedgerField) -> Self {
        match field {
            LedgerField::Asset(symbol) => EngineError::InsufficientBalance(symbol.to_string()),
            LedgerField::Collateral
            | LedgerField::CollateralAvailable
            | LedgerField::DepositLock(_) => EngineError::InsufficientCollateral(account),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(what) => EngineError::InvariantViolation(format!("duplicate {}", what)),
            StoreError::Corrupt(what) => EngineError::InvariantViolation(what),
            StoreError::Database(e) => EngineError::Store(e.to_string()),
        }
    }
}

impl From<PricingError> for EngineError {
    fn from(e: PricingError) -> Self {
        match e {
            PricingError::Invalid(v) => EngineError::Validation(v),
            PricingError::EmptySnapshot => EngineError::PriceSource("price table is empty".into()),
            PricingError::Source(msg) => EngineError::PriceSource(msg),
        }
    }
}

impl From<AbortReason> for EngineError {
    fn from(reason: AbortReason) -> Self {
        match reason {
            AbortReason::NotFound(selector) => EngineError::not_found(&selector),
            AbortReason::InsufficientBalance { account, field } => {
                EngineError::insufficient(account, &field)
            }
            AbortReason::TransferMoved { transfer_id, .. } => {
                EngineError::TransferNotFound(transfer_id.to_string())
            }
            AbortReason::Invariant(msg) => EngineError::InvariantViolation(msg),
        }
    }
}
