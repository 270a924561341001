//! Layered configuration: compiled-in defaults, optional config file, then
//! environment variables, in increasing priority. Mirrors the rest of this
//! stack's configuration surface.

use crate::types::Address;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Configuration for one watched chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Stable chain identifier, e.g. "1" for Ethereum mainnet.
    pub chain_id: String,
    pub name: String,
    /// Ordered RPC endpoints; the pool fails over left to right.
    pub rpc_urls: Vec<String>,
    pub contract_address: String,
    pub start_block: u64,
    pub required_confirmations: u64,
    pub reorg_depth: u64,
    pub batch_size: u64,
    pub polling_interval_ms: u64,
    pub restart_delay_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Per-call RPC timeout; an endpoint that exceeds this is treated as a
    /// recoverable failure and the pool fails over to the next one.
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
}

fn default_rpc_timeout_ms() -> u64 {
    20_000
}

impl ChainConfig {
    /// Validate structural invariants from the data model: both `reorgDepth`
    /// and `requiredConfirmations` must be positive; `reorgDepth >=
    /// requiredConfirmations` is recommended but not enforced.
    pub fn validate(&self) -> Result<(), String> {
        Address::new(&self.contract_address)
            .map_err(|e| format!("chain '{}': invalid contract address: {}", self.chain_id, e))?;

        if self.rpc_urls.is_empty() {
            return Err(format!("chain '{}': rpc_urls must not be empty", self.chain_id));
        }

        for url in &self.rpc_urls {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!(
                    "chain '{}': invalid RPC URL '{url}', must start with http:// or https://",
                    self.chain_id
                ));
            }
        }

        if self.required_confirmations == 0 {
            return Err(format!(
                "chain '{}': required_confirmations must be > 0",
                self.chain_id
            ));
        }

        if self.reorg_depth == 0 {
            return Err(format!("chain '{}': reorg_depth must be > 0", self.chain_id));
        }

        if self.reorg_depth < self.required_confirmations {
            tracing::warn!(
                chain_id = %self.chain_id,
                reorg_depth = self.reorg_depth,
                required_confirmations = self.required_confirmations,
                "reorg_depth is smaller than required_confirmations; reorgs past the confirmation threshold go undetected"
            );
        }

        if self.batch_size == 0 {
            return Err(format!("chain '{}': batch_size must be > 0", self.chain_id));
        }

        Ok(())
    }
}

/// Top-level configuration: a database, a pool of known chains, and a
/// selector naming which chain the running process activates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// The `NETWORK` selector: the `chain_id` key into `chains` that this
    /// process instance runs.
    pub network: String,
    pub database_url: String,
    pub chains: HashMap<String, ChainConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut chains = HashMap::new();

        chains.insert(
            "1".to_string(),
            ChainConfig {
                chain_id: "1".to_string(),
                name: "ethereum".to_string(),
                rpc_urls: vec!["https://eth.llamarpc.com".to_string()],
                contract_address: "0x0000000000000000000000000000000000000000".to_string(),
                start_block: 18_000_000,
                required_confirmations: 12,
                reorg_depth: 12,
                batch_size: 2_000,
                polling_interval_ms: 2_000,
                restart_delay_ms: 15_000,
                max_retries: 5,
                retry_delay_ms: 1_000,
                rpc_timeout_ms: 20_000,
            },
        );

        chains.insert(
            "100".to_string(),
            ChainConfig {
                chain_id: "100".to_string(),
                name: "gnosis".to_string(),
                rpc_urls: vec!["https://rpc.gnosis.gateway.fm".to_string()],
                contract_address: "0x0000000000000000000000000000000000000000".to_string(),
                start_block: 30_000_000,
                required_confirmations: 12,
                reorg_depth: 12,
                batch_size: 2_000,
                polling_interval_ms: 2_000,
                restart_delay_ms: 15_000,
                max_retries: 5,
                retry_delay_ms: 1_000,
                rpc_timeout_ms: 20_000,
            },
        );

        Self {
            network: "1".to_string(),
            database_url: "./crawler-cache.db".to_string(),
            chains,
        }
    }
}

impl AppConfig {
    /// Load configuration: defaults, then an optional file, then
    /// `CRAWLER__`-prefixed environment variables with `__` nesting, e.g.
    /// `CRAWLER__NETWORK=100` or `CRAWLER__DATABASE_URL=postgres://...`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_optional_file(None)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_from_optional_file(Some(path.as_ref()))
    }

    fn load_from_optional_file(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        if let Some(config_path) = path {
            builder = builder.add_source(File::from(config_path).required(true));
        } else {
            builder = builder
                .add_source(File::with_name("config").required(false))
                .add_source(File::with_name("~/.config/chain-event-crawler/config").required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("CRAWLER")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Validate every configured chain and the database URL. Collects every
    /// problem rather than stopping at the first.
    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();

        if self.database_url.is_empty() {
            errors.push("database_url must not be empty".to_string());
        }

        if self.chains.is_empty() {
            errors.push("at least one chain must be configured".to_string());
        }

        for chain in self.chains.values() {
            if let Err(e) = chain.validate() {
                errors.push(e);
            }
        }

        if !self.chains.contains_key(&self.network) {
            errors.push(format!(
                "network selector '{}' does not match any configured chain",
                self.network
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }

    /// The chain config selected by `network`.
    pub fn active_chain(&self) -> Result<&ChainConfig, String> {
        self.chains
            .get(&self.network)
            .ok_or_else(|| format!("network selector '{}' does not match any configured chain", self.network))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_config_has_two_chains() {
        let config = AppConfig::default();
        assert_eq!(config.chains.len(), 2);
        assert_eq!(config.network, "1");
    }

    #[test]
    fn active_chain_resolves_selector() {
        let config = AppConfig::default();
        let chain = config.active_chain().unwrap();
        assert_eq!(chain.chain_id, "1");
    }

    #[test]
    fn validation_rejects_unknown_network_selector() {
        let mut config = AppConfig::default();
        config.network = "999".to_string();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("network selector"));
    }

    #[test]
    fn validation_rejects_empty_rpc_urls() {
        let mut config = AppConfig::default();
        config.chains.get_mut("1").unwrap().rpc_urls.clear();
        let result = config.validate();
        assert!(result.is_err());
    }

    #[test]
    fn validation_rejects_zero_batch_size() {
        let mut config = AppConfig::default();
        config.chains.get_mut("1").unwrap().batch_size = 0;
        let result = config.validate();
        assert!(result.is_err());
    }

    #[test]
    fn validation_rejects_zero_required_confirmations() {
        let mut config = AppConfig::default();
        config.chains.get_mut("1").unwrap().required_confirmations = 0;
        let result = config.validate();
        assert!(result.is_err());
    }

    #[test]
    fn validation_collects_multiple_errors() {
        let mut config = AppConfig::default();
        config.database_url = String::new();
        config.chains.get_mut("1").unwrap().batch_size = 0;
        let result = config.validate();
        let err = result.unwrap_err();
        assert!(err.contains("database_url"));
        assert!(err.contains("batch_size"));
    }
}
