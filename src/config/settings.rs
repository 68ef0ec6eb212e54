//! Ledger settings loading from a TOML file
//!
//! Settings tune the query surface and the deposit feed. Every field has a default, so a
//! missing file or a partial file is fine.

use crate::{
    core::wallet::DepositAddresses,
    errors::{Error, Result},
};
use serde::Deserialize;
use std::{collections::HashSet, path::Path};
use tracing::{debug, warn};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Configuration structure representing the entire settings file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LedgerSettings {
    /// Transaction history paging
    #[serde(default)]
    pub history: HistorySettings,
    /// Deposit feed limits
    #[serde(default)]
    pub deposits: DepositSettings,
    /// Deposit address triples handed out to new wallets
    #[serde(default)]
    pub address_pool: Vec<DepositAddresses>,
}

/// Paging limits for transaction history queries
#[derive(Debug, Clone, Deserialize)]
pub struct HistorySettings {
    /// Page size used when the caller does not ask for one
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,
    /// Largest page size a caller may request
    #[serde(default = "max_page_size")]
    pub max_page_size: u64,
}

/// Limits for the batch deposit feed
#[derive(Debug, Clone, Deserialize)]
pub struct DepositSettings {
    /// Largest number of deposits accepted in one batch
    #[serde(default = "max_batch_size")]
    pub max_batch_size: usize,
}

const fn default_page_size() -> u64 {
    50
}

const fn max_page_size() -> u64 {
    500
}

const fn max_batch_size() -> usize {
    1_000
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: max_page_size(),
        }
    }
}

impl Default for DepositSettings {
    fn default() -> Self {
        Self {
            max_batch_size: max_batch_size(),
        }
    }
}

impl LedgerSettings {
    fn validate(self) -> Result<Self> {
        if self.history.default_page_size == 0 || self.history.max_page_size == 0 {
            return Err(Error::Config {
                message: "history page sizes must be greater than zero".to_string(),
            });
        }
        if self.history.default_page_size > self.history.max_page_size {
            return Err(Error::Config {
                message: "history.default_page_size exceeds history.max_page_size".to_string(),
            });
        }
        {
            let mut seen = HashSet::new();
            for entry in &self.address_pool {
                for address in [&entry.btc, &entry.usdt_trc20, &entry.usdt_bep20] {
                    if !seen.insert(address.as_str()) {
                        return Err(Error::Config {
                            message: format!("address {address} appears twice in address_pool"),
                        });
                    }
                }
            }
        }
        if self.deposits.max_batch_size == 0 {
            return Err(Error::Config {
                message: "deposits.max_batch_size must be greater than zero".to_string(),
            });
        }
        Ok(self)
    }
}

/// Loads ledger settings from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - The values are inconsistent (zero sizes, default page larger than the maximum)
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<LedgerSettings> {
    debug!("Loading ledger settings from {:?}", path.as_ref());
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read settings file: {e}"),
    })?;

    parse_settings(&contents)
}

/// Parses ledger settings from TOML text
pub fn parse_settings(contents: &str) -> Result<LedgerSettings> {
    let settings: LedgerSettings = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse settings: {e}"),
    })?;
    settings.validate()
}

/// Loads settings from `LEDGER_CONFIG` (or `./config.toml`), using defaults when the file is absent
pub fn load_default_settings() -> Result<LedgerSettings> {
    let path = std::env::var("LEDGER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    if Path::new(&path).exists() {
        load_settings(&path)
    } else {
        warn!("Settings file {} not found, using defaults", path);
        Ok(LedgerSettings::default())
    }
}
