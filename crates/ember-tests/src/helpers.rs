//! Shared helpers for integration tests.
//!
//! Blocks built here carry a correct merkle root and a trivial target, so
//! regtest consensus accepts them without mining.

use std::sync::Arc;

use ember_chain::chainstate::ChainManager;
use ember_chain::coins::MemoryCoins;
use ember_chain::store::MemoryBlockStore;
use ember_core::crypto::{self, KeyPair};
use ember_core::merkle;
use ember_core::params::{BLOCK_TIME_SECS, ChainParams};
use ember_core::types::*;

/// Simple pubkey hash from a seed byte.
pub fn pkh(seed: u8) -> Hash256 {
    Hash256([seed; 32])
}

/// Deterministic key pair from a seed byte.
pub fn key(seed: u8) -> KeyPair {
    KeyPair::from_secret_bytes([seed; 32])
}

/// Coinbase paying `value` to `owner`.
pub fn coinbase_paying(value: u64, owner: Hash256) -> Transaction {
    Transaction {
        version: 1,
        kind: TxKind::Transfer,
        inputs: vec![TxInput {
            previous_output: OutPoint::null(),
            signature: vec![],
            public_key: vec![],
        }],
        outputs: vec![TxOutput { value, pubkey_hash: owner }],
        lock_time: 0,
    }
}

/// Build a valid child of `parent` at `height`: coinbase claiming the full
/// subsidy plus `fees` to `owner`, followed by `extra` transactions.
pub fn child_block(
    parent: &BlockHeader,
    height: u64,
    owner: Hash256,
    fees: u64,
    extra: Vec<Transaction>,
    params: &ChainParams,
) -> Block {
    let mut txs = vec![coinbase_paying(params.subsidy(height) + fees, owner)];
    txs.extend(extra);
    let txids: Vec<Hash256> = txs.iter().map(|tx| tx.txid().unwrap()).collect();
    Block {
        header: BlockHeader {
            version: 1,
            prev_hash: parent.hash(),
            merkle_root: merkle::merkle_root(&txids),
            timestamp: parent.timestamp + BLOCK_TIME_SECS,
            target: u64::MAX,
            nonce: 0,
        },
        transactions: txs,
    }
}

/// Signed single-input transfer of `outpoint` (owned by `owner_key`) paying
/// `value` to `dest`.
pub fn signed_spend(
    outpoint: OutPoint,
    owner_key: &KeyPair,
    value: u64,
    dest: Hash256,
) -> Transaction {
    let mut tx = Transaction {
        version: 1,
        kind: TxKind::Transfer,
        inputs: vec![TxInput {
            previous_output: outpoint,
            signature: vec![],
            public_key: vec![],
        }],
        outputs: vec![TxOutput { value, pubkey_hash: dest }],
        lock_time: 0,
    };
    crypto::sign_transaction_input(&mut tx, 0, owner_key).unwrap();
    tx
}

/// In-memory chain manager on the given parameters.
pub fn new_manager(params: ChainParams) -> ChainManager {
    ChainManager::new(
        params,
        Arc::new(MemoryCoins::new()),
        Arc::new(MemoryBlockStore::new()),
    )
    .unwrap()
}

/// Extend the chain with `count` empty blocks on top of `parent`, each paying
/// a height-tagged owner. Returns the header of the last block accepted.
pub fn extend_chain(
    manager: &ChainManager,
    parent: &BlockHeader,
    start_height: u64,
    count: u64,
    params: &ChainParams,
) -> BlockHeader {
    let mut header = *parent;
    for height in start_height..start_height + count {
        let block = child_block(&header, height, pkh(height as u8), 0, vec![], params);
        header = block.header;
        manager.accept_block(block).unwrap();
    }
    header
}
