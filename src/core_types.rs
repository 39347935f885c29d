//! Core types used throughout the system
//!
//! These are fundamental type aliases used by all modules.

use std::collections::BTreeMap;

use crate::account::validation::AssetSymbol;

/// Account ID - opaque, globally unique, immutable after assignment.
///
/// Wallets and warehouse inventories share one id space
/// (`accounts.id` BIGSERIAL in PostgreSQL).
pub type AccountId = i64;

/// Integer quantity of a fungible asset.
///
/// Stored balances are never negative. Signed so that deltas and
/// balances share one type.
pub type Quantity = i64;

/// Asset symbol -> quantity.
///
/// `BTreeMap` keeps iteration (and therefore SQL statement order and
/// JSON output) deterministic.
pub type Assets = BTreeMap<AssetSymbol, Quantity>;
