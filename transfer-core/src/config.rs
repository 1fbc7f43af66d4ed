//! Plugin configuration

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Informational ledger metadata served by `get_info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerInfo {
    /// Total number of significant digits
    pub precision: u32,

    /// Digits after the decimal point
    pub scale: u32,

    /// ISO 4217 currency code
    pub currency_code: String,

    /// Display symbol
    pub currency_symbol: String,
}

impl Default for LedgerInfo {
    fn default() -> Self {
        Self {
            precision: 10,
            scale: 2,
            currency_code: "USD".to_string(),
            currency_symbol: "$".to_string(),
        }
    }
}

/// Configuration for one plugin instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Ledger prefix this plugin operates on
    pub ledger: String,

    /// The local account identifier
    pub account: String,

    /// Ledger metadata
    pub info: LedgerInfo,

    /// Known connector accounts on this ledger
    pub connectors: Vec<String>,

    /// Informational balance (bookkeeping is an external concern)
    pub balance: String,

    /// Depth of the peer relay mailbox
    pub mailbox_capacity: usize,

    /// Depth of the local event broadcast channel
    pub event_capacity: usize,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            ledger: "example.ledger.".to_string(),
            account: "example.ledger.alice".to_string(),
            info: LedgerInfo::default(),
            connectors: Vec::new(),
            balance: "0".to_string(),
            mailbox_capacity: 1000,
            event_capacity: 256,
        }
    }
}

impl PluginConfig {
    /// Configuration for a named account on a ledger
    pub fn for_account(ledger: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            ledger: ledger.into(),
            account: account.into(),
            ..Self::default()
        }
    }

    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = PluginConfig::default();

        if let Ok(ledger) = std::env::var("PLUGIN_LEDGER") {
            config.ledger = ledger;
        }
        if let Ok(account) = std::env::var("PLUGIN_ACCOUNT") {
            config.account = account;
        }
        if let Ok(balance) = std::env::var("PLUGIN_BALANCE") {
            config.balance = balance;
        }
        if let Ok(connectors) = std::env::var("PLUGIN_CONNECTORS") {
            config.connectors = connectors
                .split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(config)
    }
}
