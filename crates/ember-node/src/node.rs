//! Full node composition.
//!
//! [`Node`] wires persistent storage into the chain engine and exposes the
//! surface collaborators use: byte-oriented block and transaction
//! submission, tip and coin queries, listener registration, and block
//! template assembly for miners and stakers. Wire encoding at this boundary
//! is bincode; the decode happens here so everything behind it works with
//! typed values.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use ember_chain::chainstate::{ChainManager, TipInfo};
use ember_chain::notify::ChainNotifications;
use ember_core::error::{ChainError, EmberError};
use ember_core::merkle;
use ember_core::types::{
    Block, BlockHeader, Coin, Hash256, OutPoint, Transaction, TxInput, TxKind, TxOutput,
};

use crate::config::NodeConfig;
use crate::storage::RocksStore;

fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// A running full node.
pub struct Node {
    manager: Arc<ChainManager>,
}

impl Node {
    /// Open storage under the configured data directory and start the chain.
    pub fn open(config: &NodeConfig) -> Result<Self, EmberError> {
        let dir = config.network_dir();
        let store = Arc::new(
            RocksStore::open(&dir, config.network.magic_bytes()).map_err(EmberError::Chain)?,
        );
        let manager = Arc::new(ChainManager::with_coin_cache_budget(
            config.params(),
            store.clone(),
            store,
            config.coin_cache_bytes,
        )?);
        info!(network = %config.network, dir = %dir.display(), "node storage opened");
        Ok(Self { manager })
    }

    /// The chain engine, for typed access.
    pub fn manager(&self) -> &Arc<ChainManager> {
        &self.manager
    }

    /// Subscribe a collaborator to chain events.
    pub fn register_listener(&self, listener: Arc<dyn ChainNotifications>) {
        self.manager.register_listener(listener);
    }

    /// Decode and accept a block received from the network.
    pub fn submit_block(&self, bytes: &[u8]) -> Result<Hash256, EmberError> {
        let (block, _): (Block, _) =
            bincode::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| EmberError::Decode(e.to_string()))?;
        self.manager.accept_block(block)
    }

    /// Decode and admit a loose transaction to the mempool.
    pub fn submit_transaction(&self, bytes: &[u8]) -> Result<Hash256, EmberError> {
        let (tx, _): (Transaction, _) =
            bincode::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| EmberError::Decode(e.to_string()))?;
        self.manager.submit_transaction(tx)
    }

    pub fn best_tip(&self) -> Result<TipInfo, ChainError> {
        self.manager.tip()
    }

    /// A coin is unspent iff this returns `Some`.
    pub fn get_coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, ChainError> {
        self.manager.get_coin(outpoint)
    }

    /// Height at which `outpoint` was spent, for spends within the recent
    /// reorganization window.
    pub fn get_spend_height(&self, outpoint: &OutPoint) -> Option<u64> {
        self.manager.get_spend_height(outpoint)
    }

    pub fn block_hash_at(&self, height: u64) -> Option<Hash256> {
        self.manager.block_hash_at(height)
    }

    /// Assemble a block on the current tip paying `payout` the coinbase.
    ///
    /// Fills the block with the highest-fee-rate mempool transactions and
    /// leaves the nonce at zero; the caller grinds or stakes it. The target
    /// is the network's proof-of-work limit, to be tightened by whatever
    /// difficulty policy the producer runs.
    pub fn build_block_template(&self, payout: Hash256) -> Result<Block, EmberError> {
        let params = self.manager.params();
        let tip = self.manager.tip().map_err(EmberError::Chain)?;
        let parent = self
            .manager
            .header(&tip.hash)
            .ok_or_else(|| ChainError::BlockNotFound(tip.hash.to_string()))?;
        let height = tip.height + 1;

        let selected = self.manager.template_transactions();
        let fees: u64 = selected.iter().map(|(_, fee)| fee).sum();

        let coinbase = Transaction {
            version: 1,
            kind: TxKind::Transfer,
            inputs: vec![TxInput {
                previous_output: OutPoint::null(),
                signature: vec![],
                public_key: vec![],
            }],
            outputs: vec![TxOutput { value: params.subsidy(height) + fees, pubkey_hash: payout }],
            lock_time: 0,
        };

        let mut transactions = vec![coinbase];
        transactions.extend(selected.into_iter().map(|(tx, _)| tx));
        let txids: Vec<Hash256> = transactions
            .iter()
            .map(|tx| tx.txid())
            .collect::<Result<_, _>>()
            .map_err(EmberError::Tx)?;

        Ok(Block {
            header: BlockHeader {
                version: params.required_block_version(height),
                prev_hash: tip.hash,
                merkle_root: merkle::merkle_root(&txids),
                timestamp: unix_time().max(parent.timestamp + 1),
                target: params.pow_limit,
                nonce: 0,
            },
            transactions,
        })
    }

    /// Stop background activation at the next batch boundary.
    pub fn shutdown(&self) {
        self.manager.request_shutdown();
    }
}
