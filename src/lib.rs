//! Stelo Ledger - Asset Ledger and Transfer Engine
//!
//! Wallet and warehouse balances, peer payments, collateral-backed
//! warehouse transfers and a staleness-aware price cache.
//!
//! # Modules
//!
//! - [`core_types`] - Core type aliases (AccountId, Quantity, Assets)
//! - [`account`] - Account model and validated names
//! - [`ledger`] - Ledger store: conditional mutations in atomic units
//! - [`pricing`] - Price cache and asset valuation
//! - [`transfer`] - Payments, deposits, collateral, warehouse transfers
//! - [`activity`] - Recent-activity log and real-time notifications
//! - [`engine`] - Operations consumed by request handlers
//! - [`db`] - PostgreSQL pool and schema
//! - [`config`] / [`logging`] / [`clock`] - Ambient services

// Core types - must be first!
pub mod core_types;

pub mod account;
pub mod activity;
pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod pricing;
pub mod transfer;

// Convenient re-exports at crate root
pub use core_types::{AccountId, Assets, Quantity};
pub use engine::{EngineParts, LedgerEngine, Subscription};
pub use error::EngineError;
