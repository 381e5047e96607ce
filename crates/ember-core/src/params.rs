//! Chain parameters. All monetary values in sparks (1 EMBER = 10^8 sparks).
//!
//! Consensus behaviour that differs between deployments (maturity depths,
//! reorg limits, stake activation, checkpoints) lives in [`ChainParams`].
//! Every node on the same network computes identical parameters.

use crate::types::Hash256;

pub const COIN: u64 = 100_000_000;

/// Maximum issuance cap, the familiar 21M.
pub const MAX_SUPPLY: u64 = 21_000_000 * COIN;

pub const INITIAL_REWARD: u64 = 50 * COIN;
pub const HALVING_INTERVAL: u64 = 210_000;
pub const BLOCK_TIME_SECS: u64 = 60;

pub const MAX_BLOCK_SIZE: usize = 2_000_000;
pub const MAX_TX_SIZE: usize = 100_000;
pub const MAX_INPUTS: usize = 1000;
pub const MAX_OUTPUTS: usize = 1000;
pub const MAX_COINBASE_DATA: usize = 100;
pub const MIN_TX_FEE: u64 = 1000;

/// Network type: Mainnet, Testnet, or Regtest.
///
/// Selects a [`ChainParams`] preset and the data directory suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Network {
    /// Production network.
    #[default]
    Mainnet,
    /// Public test network with relaxed limits.
    Testnet,
    /// Local regression-test network, minimal difficulty, instant blocks.
    Regtest,
}

impl Network {
    /// Four-byte network identifier baked into the block file headers.
    pub fn magic_bytes(&self) -> [u8; 4] {
        match self {
            Self::Mainnet => [0x45, 0x4D, 0x42, 0x52], // "EMBR"
            Self::Testnet => [0x45, 0x4D, 0x54, 0x4E], // "EMTN"
            Self::Regtest => [0x45, 0x4D, 0x52, 0x54], // "EMRT"
        }
    }

    /// Subdirectory name appended to the base data directory path.
    pub fn data_dir_suffix(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Regtest => "regtest",
        }
    }

    /// The consensus parameters for this network.
    pub fn params(&self) -> ChainParams {
        match self {
            Self::Mainnet => ChainParams::mainnet(),
            Self::Testnet => ChainParams::testnet(),
            Self::Regtest => ChainParams::regtest(),
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.data_dir_suffix())
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(Self::Mainnet),
            "testnet" | "test" => Ok(Self::Testnet),
            "regtest" => Ok(Self::Regtest),
            other => Err(format!("unknown network: {other}")),
        }
    }
}

/// Per-network consensus parameters.
///
/// Heights and depths are in blocks, times in unix seconds.
#[derive(Debug, Clone)]
pub struct ChainParams {
    pub network: Network,
    /// Blocks before a coinbase or coinstake output may be spent.
    pub coinbase_maturity: u64,
    /// Reorganizations deeper than this are refused.
    pub max_reorg_depth: u64,
    /// Headers timestamped further than this past local time are rejected.
    pub max_future_drift: u64,
    /// Easiest (numerically largest) target a header may carry.
    pub pow_limit: u64,
    /// Height from which proof-of-stake blocks are accepted.
    pub stake_activation_height: u64,
    /// Height from which headers below `min_block_version` are obsolete.
    pub version_upgrade_height: u64,
    /// Minimum header version after the upgrade height.
    pub min_block_version: u64,
    /// Genesis block timestamp.
    pub genesis_timestamp: u64,
    /// Known-good (height, hash) pairs. Blocks at these heights must match.
    pub checkpoints: Vec<(u64, Hash256)>,
}

impl ChainParams {
    pub fn mainnet() -> Self {
        Self {
            network: Network::Mainnet,
            coinbase_maturity: 100,
            max_reorg_depth: 100,
            max_future_drift: 180,
            pow_limit: u64::MAX >> 20,
            stake_activation_height: 1000,
            version_upgrade_height: 500_000,
            min_block_version: 2,
            genesis_timestamp: 1_767_225_600,
            checkpoints: Vec::new(),
        }
    }

    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            coinbase_maturity: 30,
            max_reorg_depth: 100,
            max_future_drift: 180,
            pow_limit: u64::MAX >> 8,
            stake_activation_height: 200,
            version_upgrade_height: 100_000,
            min_block_version: 2,
            genesis_timestamp: 1_767_225_601,
            checkpoints: Vec::new(),
        }
    }

    pub fn regtest() -> Self {
        Self {
            network: Network::Regtest,
            coinbase_maturity: 15,
            max_reorg_depth: 100,
            max_future_drift: 7200,
            pow_limit: u64::MAX,
            stake_activation_height: 20,
            version_upgrade_height: u64::MAX,
            min_block_version: 1,
            genesis_timestamp: 1_767_225_602,
            checkpoints: Vec::new(),
        }
    }

    /// Base block subsidy at `height`, following the halving schedule.
    ///
    /// `INITIAL_REWARD >> (height / HALVING_INTERVAL)`, zero once the shift
    /// exhausts the reward or the epoch exceeds the shift-overflow guard.
    pub fn subsidy(&self, height: u64) -> u64 {
        let epoch = height / HALVING_INTERVAL;
        if epoch >= 64 {
            return 0;
        }
        INITIAL_REWARD >> epoch
    }

    /// The checkpoint hash pinned at `height`, if any.
    pub fn checkpoint_at(&self, height: u64) -> Option<Hash256> {
        self.checkpoints
            .iter()
            .find(|(h, _)| *h == height)
            .map(|(_, hash)| *hash)
    }

    /// Height of the highest checkpoint, or 0 when there are none.
    pub fn last_checkpoint_height(&self) -> u64 {
        self.checkpoints.iter().map(|(h, _)| *h).max().unwrap_or(0)
    }

    /// Minimum header version required at `height`.
    pub fn required_block_version(&self, height: u64) -> u64 {
        if height >= self.version_upgrade_height {
            self.min_block_version
        } else {
            1
        }
    }

    /// Whether proof-of-stake blocks are accepted at `height`.
    pub fn stake_allowed(&self, height: u64) -> bool {
        height >= self.stake_activation_height
    }
}

impl Default for ChainParams {
    fn default() -> Self {
        Self::mainnet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn networks_have_distinct_magic() {
        let m = Network::Mainnet.magic_bytes();
        let t = Network::Testnet.magic_bytes();
        let r = Network::Regtest.magic_bytes();
        assert_ne!(m, t);
        assert_ne!(m, r);
        assert_ne!(t, r);
    }

    #[test]
    fn network_from_str() {
        assert_eq!("mainnet".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!("TEST".parse::<Network>().unwrap(), Network::Testnet);
        assert_eq!("regtest".parse::<Network>().unwrap(), Network::Regtest);
        assert!("bogus".parse::<Network>().is_err());
    }

    #[test]
    fn subsidy_halves_on_schedule() {
        let params = ChainParams::mainnet();
        assert_eq!(params.subsidy(0), INITIAL_REWARD);
        assert_eq!(params.subsidy(HALVING_INTERVAL - 1), INITIAL_REWARD);
        assert_eq!(params.subsidy(HALVING_INTERVAL), INITIAL_REWARD / 2);
        assert_eq!(params.subsidy(2 * HALVING_INTERVAL), INITIAL_REWARD / 4);
    }

    #[test]
    fn subsidy_eventually_zero() {
        let params = ChainParams::mainnet();
        assert_eq!(params.subsidy(64 * HALVING_INTERVAL), 0);
        assert_eq!(params.subsidy(u64::MAX), 0);
    }

    #[test]
    fn total_schedule_supply_below_cap() {
        let params = ChainParams::mainnet();
        let mut total = 0u64;
        for epoch in 0..64u64 {
            let reward = params.subsidy(epoch * HALVING_INTERVAL);
            if reward == 0 {
                break;
            }
            total = total.saturating_add(reward.saturating_mul(HALVING_INTERVAL));
        }
        assert!(total <= MAX_SUPPLY);
    }

    #[test]
    fn checkpoint_lookup() {
        let mut params = ChainParams::regtest();
        let pinned = Hash256([0x42; 32]);
        params.checkpoints = vec![(10, pinned), (20, Hash256([0x43; 32]))];
        assert_eq!(params.checkpoint_at(10), Some(pinned));
        assert_eq!(params.checkpoint_at(11), None);
        assert_eq!(params.last_checkpoint_height(), 20);
    }

    #[test]
    fn no_checkpoints_means_height_zero() {
        assert_eq!(ChainParams::mainnet().last_checkpoint_height(), 0);
    }

    #[test]
    fn version_gating() {
        let params = ChainParams::mainnet();
        assert_eq!(params.required_block_version(0), 1);
        assert_eq!(
            params.required_block_version(params.version_upgrade_height),
            params.min_block_version
        );
    }

    #[test]
    fn stake_activation() {
        let params = ChainParams::regtest();
        assert!(!params.stake_allowed(params.stake_activation_height - 1));
        assert!(params.stake_allowed(params.stake_activation_height));
    }

    #[test]
    fn regtest_pow_limit_is_trivial() {
        assert_eq!(ChainParams::regtest().pow_limit, u64::MAX);
        assert!(ChainParams::mainnet().pow_limit < ChainParams::testnet().pow_limit);
    }
}
