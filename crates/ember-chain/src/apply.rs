//! Connecting and disconnecting blocks against the coin view.
//!
//! [`connect_block`] runs the coin-dependent half of validation — input
//! existence, maturity, value conservation, payout bounds, and batched
//! signature verification — and only then mutates the cache. A block that
//! fails any check leaves the cache untouched.
//!
//! Signature checks dominate connection cost, so they are collected during
//! the sequential pass and verified in parallel with rayon once everything
//! cheap has passed.
//!
//! [`disconnect_block`] walks the block backwards using its undo data,
//! restoring spent coins and evicting created ones.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;

use ember_core::crypto;
use ember_core::error::{BlockError, ChainError, EmberError, TxError};
use ember_core::params::{ChainParams, MAX_OUTPUTS};
use ember_core::types::{Block, Coin, CoinOrigin, Hash256, OutPoint};
use ember_core::validation;

use crate::coins::CoinsCache;
use crate::undo::{BlockUndo, SpentCoin};

/// Result of a successful block connection.
#[derive(Debug, Clone)]
pub struct ConnectResult {
    /// Undo data to persist for later disconnection.
    pub undo: BlockUndo,
    /// Sum of all transaction fees in the block.
    pub total_fees: u64,
    /// Number of coins the block created.
    pub coins_created: usize,
    /// Number of coins the block spent.
    pub coins_spent: usize,
}

/// Read overlay for validating a block against the pre-block coin state
/// plus outputs created earlier in the same block.
struct BlockOverlay<'a> {
    coins: &'a CoinsCache,
    created: HashMap<OutPoint, Coin>,
    spent: HashSet<OutPoint>,
}

impl BlockOverlay<'_> {
    fn get(&self, outpoint: &OutPoint) -> Result<Option<Coin>, ChainError> {
        if self.spent.contains(outpoint) {
            return Ok(None);
        }
        if let Some(coin) = self.created.get(outpoint) {
            return Ok(Some(coin.clone()));
        }
        self.coins.get_coin(outpoint)
    }
}

fn origin_of(tx_index: usize, block: &Block) -> CoinOrigin {
    if tx_index == 0 {
        CoinOrigin::Coinbase
    } else if block.transactions[tx_index].is_coinstake() {
        CoinOrigin::Coinstake
    } else {
        CoinOrigin::Transfer
    }
}

/// Connect a structurally and contextually valid block on top of `coins`.
///
/// `txids` are the block's transaction IDs in order, as returned by
/// [`ember_core::block_validation::validate_block`]. The cache's best block
/// must be the block's parent; on success it advances to the block itself.
///
/// Outputs created earlier in the block are spendable by later transactions.
/// Consensus faults come back as [`EmberError::Block`]; lookup failures from
/// the backend as [`EmberError::Chain`].
pub fn connect_block(
    block: &Block,
    txids: &[Hash256],
    height: u64,
    coins: &mut CoinsCache,
    params: &ChainParams,
) -> Result<ConnectResult, EmberError> {
    debug_assert_eq!(txids.len(), block.transactions.len());

    let mut overlay = BlockOverlay {
        coins,
        created: HashMap::new(),
        spent: HashSet::new(),
    };

    // (tx_index, input_index, owner pubkey hash) for the parallel batch.
    let mut sig_jobs: Vec<(usize, usize, Hash256)> = Vec::new();
    let mut undo = BlockUndo::default();
    let mut total_fees: u64 = 0;
    let mut coins_spent = 0usize;

    // Sequential pass: existence, maturity, conservation. Read-only.
    for (i, tx) in block.transactions.iter().enumerate() {
        if i > 0 {
            let mut tx_spent = Vec::with_capacity(tx.inputs.len());
            for (j, input) in tx.inputs.iter().enumerate() {
                if overlay.spent.contains(&input.previous_output) {
                    return Err(BlockError::DoubleSpend(input.previous_output.to_string()).into());
                }
                let coin = overlay
                    .get(&input.previous_output)
                    .map_err(EmberError::Chain)?
                    .ok_or_else(|| {
                        BlockError::Tx {
                            index: i,
                            source: TxError::UnknownCoin(input.previous_output.to_string()),
                        }
                    })?;
                sig_jobs.push((i, j, coin.output.pubkey_hash));
                tx_spent.push(SpentCoin::from_coin(coin));
                overlay.spent.insert(input.previous_output);
            }

            let validated = validation::check_tx_inputs(
                tx,
                |op| fetched_coin(&tx_spent, tx, op),
                height,
                params,
            )
            .map_err(|e| BlockError::Tx { index: i, source: e })?;

            total_fees = total_fees
                .checked_add(validated.fee)
                .ok_or(BlockError::Tx { index: i, source: TxError::ValueOverflow })?;
            coins_spent += tx.inputs.len();
            undo.spent.push(tx_spent);
        }

        for (k, output) in tx.outputs.iter().enumerate() {
            overlay.created.insert(
                OutPoint { txid: txids[i], index: k as u64 },
                Coin {
                    output: output.clone(),
                    height,
                    origin: origin_of(i, block),
                },
            );
        }
    }

    // Payout bounds, now that all fees are known.
    let subsidy = params.subsidy(height);
    let budget = subsidy
        .checked_add(total_fees)
        .ok_or(BlockError::Tx { index: 0, source: TxError::ValueOverflow })?;

    if block.is_proof_of_stake() {
        let coinstake = &block.transactions[1];
        let staked: u64 = undo.spent[0].iter().map(|s| s.output.value).sum();
        let paid = coinstake
            .total_output_value()
            .ok_or(BlockError::Tx { index: 1, source: TxError::ValueOverflow })?;
        let allowed = staked
            .checked_add(budget)
            .ok_or(BlockError::Tx { index: 1, source: TxError::ValueOverflow })?;
        if paid > allowed {
            return Err(BlockError::ExcessStakeReward { got: paid, allowed }.into());
        }
    } else {
        let paid = block.transactions[0]
            .total_output_value()
            .ok_or(BlockError::Tx { index: 0, source: TxError::ValueOverflow })?;
        if paid > budget {
            return Err(BlockError::ExcessIssuance { got: paid, allowed: budget }.into());
        }
    }

    // Parallel signature batch. First failure wins; index order is restored
    // by taking the minimum failing job.
    let failure = sig_jobs
        .par_iter()
        .filter_map(|(i, j, owner)| {
            crypto::verify_transaction_input(&block.transactions[*i], *j, owner)
                .err()
                .map(|_| (*i, *j))
        })
        .min();
    if let Some((i, j)) = failure {
        return Err(BlockError::Tx {
            index: i,
            source: TxError::InvalidSignature { index: j },
        }
        .into());
    }

    // All checks passed; mutate the cache.
    let mut coins_created = 0usize;
    for (i, tx) in block.transactions.iter().enumerate() {
        if i > 0 {
            for input in &tx.inputs {
                coins.spend_coin(&input.previous_output).map_err(EmberError::Chain)?;
            }
        }
        for (k, output) in tx.outputs.iter().enumerate() {
            coins
                .add_coin(
                    OutPoint { txid: txids[i], index: k as u64 },
                    Coin {
                        output: output.clone(),
                        height,
                        origin: origin_of(i, block),
                    },
                )
                .map_err(EmberError::Chain)?;
            coins_created += 1;
        }
    }
    coins.set_best_block(block.header.hash());

    Ok(ConnectResult { undo, total_fees, coins_created, coins_spent })
}

/// Coin lookup for `check_tx_inputs` over coins already fetched this tx.
///
/// `tx_spent[j]` holds the coin fetched for input `j`, so the value checks
/// see the same coins the existence pass did.
fn fetched_coin(
    tx_spent: &[SpentCoin],
    tx: &ember_core::types::Transaction,
    outpoint: &OutPoint,
) -> Option<Coin> {
    let j = tx
        .inputs
        .iter()
        .position(|input| input.previous_output == *outpoint)?;
    let spent = tx_spent.get(j)?;
    Some(Coin {
        output: spent.output.clone(),
        height: spent.height?,
        origin: spent.origin?,
    })
}

/// Disconnect `block` from the tip of `coins` using its undo data.
///
/// Evicts every coin the block created and restores every coin it spent,
/// backfilling legacy undo records from a surviving sibling output. The
/// cache's best block rewinds to the block's parent.
pub fn disconnect_block(
    block: &Block,
    txids: &[Hash256],
    undo: &BlockUndo,
    coins: &mut CoinsCache,
) -> Result<(), ChainError> {
    let hash = block.header.hash();

    if undo.spent.len() != block.transactions.len().saturating_sub(1) {
        return Err(ChainError::CorruptUndo {
            hash: hash.to_string(),
            detail: format!(
                "undo covers {} transactions, block has {}",
                undo.spent.len(),
                block.transactions.len().saturating_sub(1)
            ),
        });
    }

    for (i, tx) in block.transactions.iter().enumerate().rev() {
        for (k, _) in tx.outputs.iter().enumerate() {
            coins.evict_coin(&OutPoint { txid: txids[i], index: k as u64 });
        }

        if i == 0 {
            continue;
        }

        let spent = &undo.spent[i - 1];
        if spent.len() != tx.inputs.len() {
            return Err(ChainError::CorruptUndo {
                hash: hash.to_string(),
                detail: format!(
                    "transaction {i} spent {} inputs, undo records {}",
                    tx.inputs.len(),
                    spent.len()
                ),
            });
        }

        for (input, record) in tx.inputs.iter().zip(spent.iter()).rev() {
            let sibling = if record.height.is_none() || record.origin.is_none() {
                first_coin_of_txid(coins, &input.previous_output.txid)?
            } else {
                None
            };
            let coin = record.restore(&hash, sibling.as_ref())?;
            coins.restore_coin(input.previous_output, coin);
        }
    }

    coins.set_best_block(block.header.prev_hash);
    Ok(())
}

/// Find any surviving unspent output of `txid` for metadata backfill.
fn first_coin_of_txid(coins: &CoinsCache, txid: &Hash256) -> Result<Option<Coin>, ChainError> {
    for index in 0..MAX_OUTPUTS as u64 {
        let outpoint = OutPoint { txid: *txid, index };
        if let Some(coin) = coins.get_coin(&outpoint)? {
            return Ok(Some(coin));
        }
    }
    Ok(None)
}
