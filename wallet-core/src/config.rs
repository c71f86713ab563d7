//! Configuration for the wallet ledger

use crate::types::Currency;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Wallet ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Fallback currency when profile resolution yields nothing
    pub default_currency: Currency,

    /// RocksDB tuning
    pub rocksdb: RocksDbConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/wallets"),
            service_name: "wallet-core".to_string(),
            default_currency: Currency::USD,
            rocksdb: RocksDbConfig::default(),
        }
    }
}

/// RocksDB tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_background_jobs: 2,
        }
    }
}

impl Config {
    /// Load from TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("WALLET_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(code) = std::env::var("WALLET_DEFAULT_CURRENCY") {
            config.default_currency = Currency::from_code(&code).ok_or_else(|| {
                crate::Error::Config(format!("Unknown currency code: {}", code))
            })?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "wallet-core");
        assert_eq!(config.default_currency, Currency::USD);
    }

    #[test]
    fn test_from_env_rejects_bad_currency() {
        std::env::set_var("WALLET_DEFAULT_CURRENCY", "NOPE");
        let result = Config::from_env();
        std::env::remove_var("WALLET_DEFAULT_CURRENCY");
        assert!(result.is_err());
    }
}
