//! Ember chain-state node binary.
//!
//! Opens the RocksDB-backed chain state, replays the stored index, reports
//! the best tip, and optionally builds a block template for an external
//! miner or staker. Networking and RPC live outside this engine; the binary
//! is the offline surface for the validation core.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use ember_core::params::Network;
use ember_core::types::Hash256;
use ember_node_lib::{Node, NodeConfig};
use tracing::{error, info};

/// Ember chain-state engine — validates first, burns bright after.
#[derive(Parser, Debug)]
#[command(
    name = "ember-node",
    version,
    about = "Ember chain-state node with RocksDB storage"
)]
struct Args {
    /// Data directory for blockchain storage
    #[arg(long, default_value = None)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Build a block template paying the given destination (64 hex chars)
    /// and print it instead of just reporting the tip.
    #[arg(long)]
    template_payout: Option<String>,

    /// Coin cache budget in megabytes; exceeding it flushes to disk early.
    #[arg(long, default_value_t = 32)]
    coin_cache_mb: usize,

    /// Connect to the public test network (testnet) instead of mainnet.
    ///
    /// Uses separate magic bytes and data directory.
    #[arg(long, conflicts_with = "regtest")]
    testnet: bool,

    /// Run in local regression-test mode (regtest).
    ///
    /// Minimal proof-of-work difficulty; intended for development and testing.
    #[arg(long, conflicts_with = "testnet")]
    regtest: bool,
}

impl Args {
    /// Convert CLI args into a NodeConfig.
    fn into_config(self) -> (NodeConfig, String, Option<String>) {
        // Determine network from CLI flags.
        let network = if self.regtest {
            Network::Regtest
        } else if self.testnet {
            Network::Testnet
        } else {
            Network::Mainnet
        };

        let default_data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ember");

        let data_dir = self.data_dir.unwrap_or(default_data_dir);

        let config = NodeConfig {
            network,
            data_dir,
            log_level: self.log_level,
            coin_cache_bytes: self.coin_cache_mb * 1024 * 1024,
        };

        (config, self.log_format, self.template_payout)
    }
}

fn main() {
    // Parse CLI arguments.
    let args = Args::parse();
    let (config, log_format, template_payout) = args.into_config();

    // Initialize logging.
    init_logging(&config.log_level, &log_format);

    info!("Ember Node v{}", env!("CARGO_PKG_VERSION"));
    info!("network: {}", config.network);
    info!("data_dir: {:?}", config.network_dir());

    // Create data directory if it doesn't exist.
    if let Err(e) = std::fs::create_dir_all(config.network_dir()) {
        error!("failed to create data_dir: {}", e);
        process::exit(1);
    }

    // Open the chain state. This replays the stored block index, restores
    // the active chain, and re-runs best-chain activation.
    let node = match Node::open(&config) {
        Ok(n) => n,
        Err(e) => {
            error!("failed to open chain state: {}", e);
            process::exit(1);
        }
    };

    match node.best_tip() {
        Ok(tip) => info!(
            "chain_tip: height={} hash={} work={}",
            tip.height,
            hex::encode(tip.hash.as_bytes()),
            tip.chain_work,
        ),
        Err(e) => {
            error!("failed to read chain tip: {}", e);
            process::exit(1);
        }
    }

    if let Some(payout_hex) = template_payout {
        if let Err(e) = print_template(&node, &payout_hex) {
            error!("{}", e);
            process::exit(1);
        }
    }

    node.shutdown();
    info!("Ember node shutdown complete");
}

/// Build a block template on the current tip and print it as hex.
///
/// The output is the wire encoding of the unsolved block; the caller is
/// expected to grind the nonce (or replace the coinstake) before submitting
/// it back.
fn print_template(node: &Node, payout_hex: &str) -> Result<(), String> {
    let bytes = hex::decode(payout_hex)
        .map_err(|e| format!("invalid --template-payout hex: {}", e))?;
    let payout: [u8; 32] = bytes
        .try_into()
        .map_err(|_| "invalid --template-payout: expected 32 bytes".to_string())?;

    let block = node
        .build_block_template(Hash256::from_bytes(payout))
        .map_err(|e| format!("failed to build template: {}", e))?;

    let encoded = bincode::encode_to_vec(&block, bincode::config::standard())
        .map_err(|e| format!("failed to encode template: {}", e))?;

    info!(
        "template: parent={} txs={} size={}",
        hex::encode(block.header.prev_hash.as_bytes()),
        block.transactions.len(),
        encoded.len(),
    );
    println!("{}", hex::encode(encoded));
    Ok(())
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Pass `format = "json"` for structured JSON output (suitable for log
/// aggregation pipelines). Any other value defaults to human-readable text.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
