//! Genesis block definition.
//!
//! The genesis block is the first block in the chain (height 0). Its coinbase
//! carries the genesis message and pays nothing, so no unspendable coin ever
//! enters the coin set. All values are deterministic per network; every node
//! computes the identical genesis block.

use crate::merkle;
use crate::params::ChainParams;
use crate::types::{Block, BlockHeader, Hash256, OutPoint, Transaction, TxInput, TxKind, TxOutput};

/// Message embedded in the genesis coinbase.
pub const GENESIS_MESSAGE: &[u8] = b"From a spark, a fire. Ember genesis 2026.";

/// Build the genesis block for the given network parameters.
pub fn genesis_block(params: &ChainParams) -> Block {
    let coinbase = genesis_coinbase();
    // Hardcoded transaction, serialization cannot fail.
    let txid = coinbase
        .txid()
        .unwrap_or_else(|_| unreachable!("genesis coinbase is fixed valid data"));

    Block {
        header: BlockHeader {
            version: 1,
            prev_hash: Hash256::ZERO,
            merkle_root: merkle::merkle_root(&[txid]),
            timestamp: params.genesis_timestamp,
            target: params.pow_limit,
            nonce: 0,
        },
        transactions: vec![coinbase],
    }
}

/// Hash of the genesis block for the given network parameters.
pub fn genesis_hash(params: &ChainParams) -> Hash256 {
    genesis_block(params).header.hash()
}

/// Check whether a block is this network's genesis block.
pub fn is_genesis(block: &Block, params: &ChainParams) -> bool {
    block.header.hash() == genesis_hash(params)
}

fn genesis_coinbase() -> Transaction {
    Transaction {
        version: 1,
        kind: TxKind::Transfer,
        inputs: vec![TxInput {
            previous_output: OutPoint::null(),
            signature: GENESIS_MESSAGE.to_vec(),
            public_key: vec![],
        }],
        outputs: Vec::<TxOutput>::new(),
        lock_time: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_validation;

    #[test]
    fn genesis_is_deterministic() {
        let params = ChainParams::mainnet();
        assert_eq!(genesis_block(&params), genesis_block(&params));
        assert_eq!(genesis_hash(&params), genesis_hash(&params));
    }

    #[test]
    fn genesis_differs_per_network() {
        let mainnet = genesis_hash(&ChainParams::mainnet());
        let testnet = genesis_hash(&ChainParams::testnet());
        let regtest = genesis_hash(&ChainParams::regtest());
        assert_ne!(mainnet, testnet);
        assert_ne!(mainnet, regtest);
        assert_ne!(testnet, regtest);
    }

    #[test]
    fn genesis_links_to_nothing() {
        let block = genesis_block(&ChainParams::regtest());
        assert!(block.header.prev_hash.is_zero());
        assert!(block.transactions[0].is_coinbase());
        assert!(block.transactions[0].outputs.is_empty());
    }

    #[test]
    fn genesis_is_structurally_valid() {
        let regtest = genesis_block(&ChainParams::regtest());
        assert!(block_validation::validate_block_structure(&regtest).is_ok());
    }

    #[test]
    fn is_genesis_detects_only_genesis() {
        let params = ChainParams::regtest();
        let block = genesis_block(&params);
        assert!(is_genesis(&block, &params));

        let mut other = block.clone();
        other.header.nonce = 1;
        assert!(!is_genesis(&other, &params));
        assert!(!is_genesis(&genesis_block(&ChainParams::mainnet()), &params));
    }
}
