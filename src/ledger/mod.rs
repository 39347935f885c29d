//! Ledger Store
//!
//! Exclusive owner of balance state. Balances change only through
//! [`ConditionalMutation`]s applied inside a [`LedgerTx`].
//!
//! # Backends
//!
//! - [`MemoryLedger`]: optimistic, commit-time re-validation
//! - [`PgLedger`]: PostgreSQL transaction with row locks

pub mod memory;
pub mod mutation;
pub mod postgres;
pub mod store;

pub use memory::MemoryLedger;
pub use mutation::{
    AccountSelector, ConditionalMutation, FieldDelta, LedgerField, MutationOutcome,
};
pub use postgres::PgLedger;
pub use store::{AbortReason, LedgerStore, LedgerTx, StoreError, UnitOutcome};
