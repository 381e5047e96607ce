//! Block validation.
//!
//! Two levels of validation:
//!
//! - **Structural** ([`validate_block_structure`]): context-free checks on
//!   block format, merkle root, coinbase and coinstake position, proof of
//!   work, and per-transaction structure.
//! - **Contextual** ([`validate_block`]): checks that need the parent and
//!   clock — header linkage era, version gating, timestamps, checkpoints,
//!   stake activation, and transaction finality.
//!
//! Coin-dependent checks (input existence, maturity, signatures, payout
//! bounds) happen during block connection, where the coin view for the
//! block's parent is available.

use std::collections::HashSet;

use crate::error::{BlockError, TxError};
use crate::merkle;
use crate::params::{ChainParams, MAX_BLOCK_SIZE};
use crate::types::{Block, Hash256};
use crate::validation;

/// Context required for contextual block validation.
///
/// The caller fills these from the parent's index entry and the local clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderContext {
    /// Height of the block being validated.
    pub height: u64,
    /// Parent block's timestamp, for the monotonicity check.
    pub prev_timestamp: u64,
    /// Current wall-clock time in unix seconds.
    pub current_time: u64,
}

/// Check whether a header hash satisfies its claimed proof-of-work target.
///
/// Interprets the first 8 bytes of the header hash as a little-endian u64 and
/// requires it at most `target`. A target of `u64::MAX` accepts any hash.
pub fn check_proof_of_work(block: &Block) -> bool {
    let hash = block.header.hash();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.0[0..8]);
    u64::from_le_bytes(prefix) <= block.header.target
}

/// Validate block structure (context-free).
///
/// Checks:
/// - At least one transaction (the coinbase), and coinbase only at index 0
/// - Coinstake, when present, only at index 1
/// - Proof-of-stake blocks carry an empty-output coinbase
/// - No duplicate transaction IDs
/// - Merkle root in the header matches the computed root
/// - Serialized size within [`MAX_BLOCK_SIZE`]
/// - Proof-of-work blocks satisfy their claimed target
/// - Every transaction passes structural validation
///
/// Returns the block's txids in order, computed once for the merkle check.
pub fn validate_block_structure(block: &Block) -> Result<Vec<Hash256>, BlockError> {
    if block.transactions.is_empty() {
        return Err(BlockError::NoCoinbase);
    }

    if !block.transactions[0].is_coinbase() {
        return Err(BlockError::FirstTxNotCoinbase);
    }

    for (i, tx) in block.transactions.iter().enumerate().skip(1) {
        if tx.is_coinbase() {
            return Err(BlockError::MultipleCoinbase);
        }
        if tx.is_coinstake() && i != 1 {
            return Err(BlockError::CoinstakeOutOfPlace(i));
        }
    }

    let is_pos = block.is_proof_of_stake();

    if is_pos {
        // The stake pays through the coinstake; the coinbase is a shell.
        if let Some(paid) = block.transactions[0].total_output_value() {
            if paid > 0 {
                return Err(BlockError::NonEmptyStakeCoinbase { got: paid });
            }
        }
    }

    for (i, tx) in block.transactions.iter().enumerate() {
        validation::validate_transaction_structure(tx)
            .map_err(|e| BlockError::Tx { index: i, source: e })?;
    }

    let mut seen = HashSet::with_capacity(block.transactions.len());
    let mut txids = Vec::with_capacity(block.transactions.len());
    for (i, tx) in block.transactions.iter().enumerate() {
        let txid = tx
            .txid()
            .map_err(|e| BlockError::Tx { index: i, source: e })?;
        if !seen.insert(txid) {
            return Err(BlockError::DuplicateTxid(txid.to_string()));
        }
        txids.push(txid);
    }

    if block.header.merkle_root != merkle::merkle_root(&txids) {
        return Err(BlockError::InvalidMerkleRoot);
    }

    let encoded = bincode::encode_to_vec(block, bincode::config::standard())
        .map_err(|e| BlockError::Tx {
            index: 0,
            source: TxError::Serialization(e.to_string()),
        })?;
    if encoded.len() > MAX_BLOCK_SIZE {
        return Err(BlockError::OversizedBlock {
            size: encoded.len(),
            max: MAX_BLOCK_SIZE,
        });
    }

    // Stake blocks are not required to meet the hash target; their proof is
    // the coinstake signature over a mature coin, checked at connect time.
    if !is_pos && !check_proof_of_work(block) {
        return Err(BlockError::BadProof);
    }

    Ok(txids)
}

/// Validate a block against its parent and the clock (contextual).
///
/// Performs structural validation, then:
/// - Rejects targets easier than the network's proof-of-work limit
/// - Enforces minimum header version past the upgrade height
/// - Requires the timestamp to be after the parent and within future drift
/// - Requires agreement with any checkpoint pinned at this height
/// - Rejects proof-of-stake blocks before stake activation
/// - Requires every transaction to be final at this height and time
///
/// Returns the block's txids in order.
pub fn validate_block(
    block: &Block,
    ctx: &HeaderContext,
    params: &ChainParams,
) -> Result<Vec<Hash256>, BlockError> {
    let txids = validate_block_structure(block)?;

    if block.header.target > params.pow_limit {
        return Err(BlockError::TargetAboveLimit {
            got: block.header.target,
            limit: params.pow_limit,
        });
    }

    let min_version = params.required_block_version(ctx.height);
    if block.header.version < min_version {
        return Err(BlockError::ObsoleteVersion {
            got: block.header.version,
            min: min_version,
        });
    }

    if block.header.timestamp <= ctx.prev_timestamp {
        return Err(BlockError::TimestampNotAfterParent);
    }

    let max_time = ctx.current_time.saturating_add(params.max_future_drift);
    if block.header.timestamp > max_time {
        return Err(BlockError::TimestampTooFar(block.header.timestamp - max_time));
    }

    if let Some(pinned) = params.checkpoint_at(ctx.height) {
        if block.header.hash() != pinned {
            return Err(BlockError::CheckpointMismatch { height: ctx.height });
        }
    }

    if block.is_proof_of_stake() && !params.stake_allowed(ctx.height) {
        return Err(BlockError::StakeBeforeActivation {
            height: ctx.height,
            activation: params.stake_activation_height,
        });
    }

    for (i, tx) in block.transactions.iter().enumerate() {
        if !tx.is_final(ctx.height, block.header.timestamp) {
            return Err(BlockError::Tx {
                index: i,
                source: TxError::NotFinal { height: ctx.height },
            });
        }
    }

    Ok(txids)
}
