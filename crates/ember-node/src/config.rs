//! Node configuration.
//!
//! [`NodeConfig`] carries the handful of settings a node needs at startup:
//! which network to join, where persistent data lives, and the log filter.
//! The binary fills it from command-line flags.

use std::path::PathBuf;

use ember_chain::chainstate::DEFAULT_COIN_CACHE_BUDGET;
use ember_core::params::{ChainParams, Network};

/// Configuration for a full node instance.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Network to join; selects consensus parameters and the data subdir.
    pub network: Network,
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// Log level filter string (e.g. "info", "debug", "ember_chain=trace").
    pub log_level: String,
    /// Coin cache byte budget; over-budget activations flush early.
    pub coin_cache_bytes: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ember");

        Self {
            network: Network::Mainnet,
            data_dir,
            log_level: "info".to_string(),
            coin_cache_bytes: DEFAULT_COIN_CACHE_BUDGET,
        }
    }
}

impl NodeConfig {
    /// Per-network storage directory.
    pub fn network_dir(&self) -> PathBuf {
        self.data_dir.join(self.network.data_dir_suffix())
    }

    /// Consensus parameters for the configured network.
    pub fn params(&self) -> ChainParams {
        self.network.params()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_network_is_mainnet() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.network, Network::Mainnet);
    }

    #[test]
    fn default_data_dir_ends_with_ember() {
        let cfg = NodeConfig::default();
        assert!(
            cfg.data_dir.ends_with("ember"),
            "data_dir should end with 'ember': {:?}",
            cfg.data_dir
        );
    }

    #[test]
    fn network_dir_appends_suffix() {
        let cfg = NodeConfig {
            network: Network::Regtest,
            data_dir: PathBuf::from("/tmp/ember-test"),
            ..NodeConfig::default()
        };
        assert_eq!(cfg.network_dir(), PathBuf::from("/tmp/ember-test/regtest"));
    }

    #[test]
    fn params_follow_network() {
        let cfg = NodeConfig { network: Network::Regtest, ..NodeConfig::default() };
        assert_eq!(cfg.params().network, Network::Regtest);
    }
}
