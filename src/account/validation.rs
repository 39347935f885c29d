//! Input validation for wallet addresses, asset symbols and requests
//!
//! This module provides validated types that enforce naming rules.
//! All fields are private to force validation through the public API.

use std::borrow::Borrow;
use std::fmt;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::core_types::Quantity;

// ============================================================================
// Validation Errors
// ============================================================================

/// Validation errors for request fields
///
/// Raised before any atomic unit starts.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid length for {field}: expected {min}-{max}, got {actual}")]
    InvalidLength {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("Invalid format for {field}: '{value}' (expected: {expected})")]
    InvalidFormat {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Quantity of '{symbol}' must be a positive integer, got {quantity}")]
    NonPositiveQuantity { symbol: String, quantity: Quantity },

    #[error("At least one asset is required")]
    EmptyAssets,

    #[error("Asset '{0}' cannot be used here")]
    ReserveAssetNotAllowed(String),

    #[error("Unknown asset: '{0}'")]
    UnknownAsset(String),

    #[error("Source and target account cannot be the same")]
    SameAccount,

    #[error("Amount must be non-zero")]
    ZeroAmount,

    #[error("Invalid webhook URL: '{0}'")]
    InvalidWebhook(String),

    #[error("Total value is out of range")]
    ValueOverflow,
}

// ============================================================================
// WalletAddress - Validated Wallet Address (Private Fields)
// ============================================================================

/// Validated wallet address (guaranteed 3-24 lowercase ASCII letters)
///
/// Addresses are immutable once a wallet exists, and usernames share the
/// same namespace, so a username is also a valid address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WalletAddress(String);

impl WalletAddress {
    pub const MIN_LEN: usize = 3;
    pub const MAX_LEN: usize = 24;

    /// Create a new validated WalletAddress
    ///
    /// # Validation Rules
    /// - Lowercase ASCII letters only
    /// - Length: 3-24 characters
    /// - Regex: ^[a-z]{3,24}$
    ///
    /// # Examples
    /// ```
    /// use stelo_ledger::account::validation::WalletAddress;
    ///
    /// let addr = WalletAddress::new("alice").unwrap();
    /// assert_eq!(addr.as_str(), "alice");
    ///
    /// assert!(WalletAddress::new("Alice").is_err());
    /// ```
    pub fn new(address: &str) -> Result<Self, ValidationError> {
        let address = address.trim();

        if address.len() < Self::MIN_LEN || address.len() > Self::MAX_LEN {
            return Err(ValidationError::InvalidLength {
                field: "address",
                min: Self::MIN_LEN,
                max: Self::MAX_LEN,
                actual: address.len(),
            });
        }

        if !address.chars().all(|c| c.is_ascii_lowercase()) {
            return Err(ValidationError::InvalidFormat {
                field: "address",
                value: address.to_string(),
                expected: "lowercase letters only",
            });
        }

        Ok(Self(address.to_string()))
    }

    /// Get the validated address as &str
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert into owned String
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for WalletAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// AssetSymbol - Validated Asset Symbol (Private Fields)
// ============================================================================

/// Validated asset symbol, e.g. `stelo`, `gold`, `wood`
///
/// Serializes as a plain string; deserialization runs validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetSymbol(String);

impl AssetSymbol {
    pub const MAX_LEN: usize = 32;

    /// Create a new validated AssetSymbol
    ///
    /// # Validation Rules
    /// - Lowercase letters, digits, underscore
    /// - Must start with a letter
    /// - Length: 1-32 characters
    pub fn new(symbol: &str) -> Result<Self, ValidationError> {
        let symbol = symbol.trim();

        if symbol.is_empty() || symbol.len() > Self::MAX_LEN {
            return Err(ValidationError::InvalidLength {
                field: "asset",
                min: 1,
                max: Self::MAX_LEN,
                actual: symbol.len(),
            });
        }

        let starts_with_letter = symbol
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase());
        if !starts_with_letter
            || !symbol
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(ValidationError::InvalidFormat {
                field: "asset",
                value: symbol.to_string(),
                expected: "lowercase letters, numbers, underscore; leading letter",
            });
        }

        Ok(Self(symbol.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for AssetSymbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for AssetSymbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AssetSymbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<AssetSymbol> for String {
    fn from(symbol: AssetSymbol) -> Self {
        symbol.0
    }
}

// ============================================================================
// Free-standing checks
// ============================================================================

/// Check a warehouse display name: 1-64 printable characters
pub fn validate_warehouse_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    let len = name.chars().count();
    if len == 0 || len > 64 {
        return Err(ValidationError::InvalidLength {
            field: "warehouse name",
            min: 1,
            max: 64,
            actual: len,
        });
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(ValidationError::InvalidFormat {
            field: "warehouse name",
            value: name.to_string(),
            expected: "printable characters",
        });
    }
    Ok(name.to_string())
}

/// Check a smart-wallet webhook URL (http or https, with a host).
///
/// Returns the URL in the normalized form the notifier will request.
pub fn validate_webhook(url: &str) -> Result<String, ValidationError> {
    let url = url.trim();
    let invalid = || ValidationError::InvalidWebhook(url.to_string());
    if url.len() > 2048 {
        return Err(invalid());
    }

    let parsed = Url::parse(url).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host().is_none() {
        return Err(invalid());
    }
    Ok(parsed.into())
}

/// Memos are free text, at most 256 characters
pub fn validate_memo(memo: &str) -> Result<(), ValidationError> {
    let len = memo.chars().count();
    if len > 256 {
        return Err(ValidationError::InvalidLength {
            field: "memo",
            min: 0,
            max: 256,
            actual: len,
        });
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // WalletAddress Tests
    // ========================================================================

    #[test]
    fn test_wallet_address_valid() {
        assert!(WalletAddress::new("bob").is_ok());
        assert!(WalletAddress::new("alice").is_ok());
        assert!(WalletAddress::new("abcdefghijklmnopqrstuvwx").is_ok()); // 24 chars
    }

    #[test]
    fn test_wallet_address_invalid_length() {
        let err = WalletAddress::new("ab").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidLength { .. }));

        let err = WalletAddress::new("abcdefghijklmnopqrstuvwxy").unwrap_err(); // 25 chars
        assert!(matches!(err, ValidationError::InvalidLength { .. }));
    }

    #[test]
    fn test_wallet_address_lowercase_letters_only() {
        for bad in ["Alice", "alice1", "al_ice", "al ice", "álice"] {
            let err = WalletAddress::new(bad).unwrap_err();
            assert!(
                matches!(
                    err,
                    ValidationError::InvalidFormat { .. } | ValidationError::InvalidLength { .. }
                ),
                "{bad} should be rejected"
            );
        }
    }

    // ========================================================================
    // AssetSymbol Tests
    // ========================================================================

    #[test]
    fn test_asset_symbol_valid() {
        assert!(AssetSymbol::new("stelo").is_ok());
        assert!(AssetSymbol::new("gold").is_ok());
        assert!(AssetSymbol::new("iron_ore").is_ok());
        assert!(AssetSymbol::new("x2").is_ok());
    }

    #[test]
    fn test_asset_symbol_invalid() {
        assert!(matches!(
            AssetSymbol::new("").unwrap_err(),
            ValidationError::InvalidLength { .. }
        ));
        assert!(matches!(
            AssetSymbol::new("Gold").unwrap_err(),
            ValidationError::InvalidFormat { .. }
        ));
        assert!(matches!(
            AssetSymbol::new("2gold").unwrap_err(),
            ValidationError::InvalidFormat { .. }
        ));
        assert!(matches!(
            AssetSymbol::new("go-ld").unwrap_err(),
            ValidationError::InvalidFormat { .. }
        ));
    }

    #[test]
    fn test_asset_symbol_serde() {
        let symbol: AssetSymbol = serde_json::from_str("\"wood\"").unwrap();
        assert_eq!(symbol.as_str(), "wood");
        assert_eq!(serde_json::to_string(&symbol).unwrap(), "\"wood\"");

        assert!(serde_json::from_str::<AssetSymbol>("\"WOOD\"").is_err());
    }

    #[test]
    fn test_asset_symbol_map_lookup_by_str() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(AssetSymbol::new("gold").unwrap(), 5);
        assert_eq!(map.get("gold"), Some(&5));
    }

    // ========================================================================
    // Free-standing checks
    // ========================================================================

    #[test]
    fn test_warehouse_name() {
        assert_eq!(validate_warehouse_name("  North Depot ").unwrap(), "North Depot");
        assert!(validate_warehouse_name("").is_err());
        assert!(validate_warehouse_name(&"x".repeat(65)).is_err());
        assert!(validate_warehouse_name("bad\nname").is_err());
    }

    #[test]
    fn test_webhook_url() {
        assert!(validate_webhook("https://hooks.example.com/stelo").is_ok());
        assert!(validate_webhook("http://127.0.0.1:8080/hook").is_ok());
        assert!(validate_webhook("ftp://example.com").is_err());
        assert!(validate_webhook("https://").is_err());
        assert!(validate_webhook("https://exa mple.com").is_err());
        assert!(validate_webhook("mailto:ops@example.com").is_err());
    }

    #[test]
    fn test_webhook_url_must_be_sendable() {
        assert!(validate_webhook("https://[::1").is_err());
        assert!(validate_webhook("http://exa^mple.com/hook").is_err());
        assert!(validate_webhook("http://host:99999/x").is_err());
        assert!(validate_webhook(&format!("https://example.com/{}", "a".repeat(2048))).is_err());

        assert_eq!(
            validate_webhook(" https://Hooks.Example.com/shop ").unwrap(),
            "https://hooks.example.com/shop"
        );
        assert_eq!(
            validate_webhook("http://[::1]:8080").unwrap(),
            "http://[::1]:8080/"
        );
    }

    #[test]
    fn test_memo_length() {
        assert!(validate_memo("").is_ok());
        assert!(validate_memo(&"x".repeat(256)).is_ok());
        assert!(matches!(
            validate_memo(&"x".repeat(257)),
            Err(ValidationError::InvalidLength { field: "memo", .. })
        ));
    }
}
