//! Gateway configuration

use crate::error::{Error, Result};
use crate::scheduler::SweepConfig;
use serde::{Deserialize, Serialize};
use wallet_core::Currency;

/// Top-level gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Root data directory; wallet and network stores live underneath
    pub data_dir: String,

    /// Default wallet currency for participants without a profile
    pub default_currency: String,

    /// Compensation plan TOML path (empty = built-in defaults)
    #[serde(default)]
    pub plan_path: String,

    /// Sweep loop settings
    #[serde(default)]
    pub sweep: SweepConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            default_currency: "USD".to_string(),
            plan_path: String::new(),
            sweep: SweepConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load from TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("PLAYGRID_DATA_DIR") {
            config.data_dir = dir;
        }
        if let Ok(currency) = std::env::var("PLAYGRID_DEFAULT_CURRENCY") {
            config.default_currency = currency;
        }
        if let Ok(path) = std::env::var("PLAYGRID_PLAN_PATH") {
            config.plan_path = path;
        }
        if let Ok(secs) = std::env::var("PLAYGRID_SWEEP_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse() {
                config.sweep.interval_secs = secs;
            }
        }

        config
    }

    /// Parsed default currency
    pub fn default_currency(&self) -> Result<Currency> {
        Currency::from_code(&self.default_currency).ok_or_else(|| {
            Error::Config(format!("Unknown currency code: {}", self.default_currency))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = GatewayConfig::default();
        assert_eq!(config.default_currency().unwrap(), Currency::USD);
        assert!(config.sweep.auto_sweep);
    }

    #[test]
    fn test_from_toml() {
        let config: GatewayConfig = toml::from_str(
            r#"
            data_dir = "/var/lib/playgrid"
            default_currency = "BRL"

            [sweep]
            interval_secs = 600
            auto_sweep = false
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, "/var/lib/playgrid");
        assert_eq!(config.default_currency().unwrap(), Currency::BRL);
        assert_eq!(config.sweep.interval_secs, 600);
        assert!(!config.sweep.auto_sweep);
    }

    #[test]
    fn test_unknown_currency_rejected() {
        let config = GatewayConfig {
            default_currency: "XXX".to_string(),
            ..Default::default()
        };
        assert!(config.default_currency().is_err());
    }
}
