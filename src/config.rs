use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Configuration load errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Per-module level overrides, keyed by module (`ledger`, `pricing`, ...)
    #[serde(default)]
    pub log_targets: BTreeMap<String, String>,
    /// PostgreSQL connection URL for the ledger store
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Stable reserve asset, valued 1:1 and used for collateral
    pub reserve_asset: String,
    /// Wallet that funds treasury grants
    #[serde(default)]
    pub treasury_address: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            reserve_asset: "stelo".to_string(),
            treasury_address: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PricingConfig {
    /// A cached price older than this is refreshed on use
    pub entry_ttl_secs: u64,
    /// Whole-table reload is only considered past this age
    pub snapshot_ttl_secs: u64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            entry_ttl_secs: 30 * 60,
            snapshot_ttl_secs: 60 * 60,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WebhookConfig {
    pub timeout_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ActivityConfig {
    /// Entries kept per account
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            ttl_secs: 5 * 24 * 60 * 60,
        }
    }
}

impl AppConfig {
    /// Load `config/<env>.yaml`
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        Self::from_file(format!("config/{}.yaml", env))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.reserve_asset.trim().is_empty() {
            return Err(ConfigError::Invalid("ledger.reserve_asset is empty".into()));
        }
        if self.pricing.entry_ttl_secs == 0 || self.pricing.snapshot_ttl_secs == 0 {
            return Err(ConfigError::Invalid("pricing ttl must be positive".into()));
        }
        if self.activity.capacity == 0 {
            return Err(ConfigError::Invalid("activity.capacity must be positive".into()));
        }
        Ok(())
    }
}
