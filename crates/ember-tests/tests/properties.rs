//! Property tests for the engine's core invariants.

use std::sync::Arc;

use proptest::prelude::*;

use ember_chain::apply;
use ember_chain::candidates::{CandidateKey, CandidateSet};
use ember_chain::coins::{CoinsCache, MemoryCoins};
use ember_chain::mempool::Mempool;
use ember_core::merkle;
use ember_core::params::{ChainParams, HALVING_INTERVAL, MIN_TX_FEE};
use ember_core::types::*;
use ember_tests::helpers::*;

// ---------------------------------------------------------------
// Connecting a block and disconnecting it again restores the coin
// view exactly: spent coins reappear, created coins vanish, and
// the best-block marker returns to the parent.
// ---------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn connect_then_disconnect_is_identity(
        coins in prop::collection::vec((2_000u64..1_000_000, any::<bool>()), 1..8),
        height in 1u64..100_000,
    ) {
        let params = ChainParams::regtest();
        let owner_key = key(11);
        let owner = owner_key.public_key().pubkey_hash();
        let prev_hash = Hash256([0x01; 32]);

        let mut cache = CoinsCache::new(Arc::new(MemoryCoins::new())).unwrap();
        cache.set_best_block(prev_hash);

        let mut funded = Vec::new();
        for (i, (value, spend)) in coins.iter().enumerate() {
            let outpoint = OutPoint { txid: Hash256([i as u8 + 1; 32]), index: 0 };
            let coin = Coin {
                output: TxOutput { value: *value, pubkey_hash: owner },
                height: 0,
                origin: CoinOrigin::Transfer,
            };
            cache.add_coin(outpoint, coin.clone()).unwrap();
            funded.push((outpoint, coin, *spend));
        }

        // One spend per selected coin, each paying a flat fee.
        let mut txs = Vec::new();
        let mut total_fees = 0u64;
        for (outpoint, coin, spend) in &funded {
            if *spend {
                txs.push(signed_spend(*outpoint, &owner_key, coin.output.value - MIN_TX_FEE, pkh(0xEE)));
                total_fees += MIN_TX_FEE;
            }
        }
        let mut transactions = vec![coinbase_paying(params.subsidy(height) + total_fees, pkh(0xCB))];
        transactions.extend(txs);
        let txids: Vec<Hash256> = transactions.iter().map(|tx| tx.txid().unwrap()).collect();
        let block = Block {
            header: BlockHeader {
                version: 1,
                prev_hash,
                merkle_root: merkle::merkle_root(&txids),
                timestamp: 1,
                target: u64::MAX,
                nonce: 0,
            },
            transactions,
        };

        let result = apply::connect_block(&block, &txids, height, &mut cache, &params).unwrap();
        for (outpoint, _, spend) in &funded {
            prop_assert_eq!(cache.have_coin(outpoint).unwrap(), !*spend);
        }

        apply::disconnect_block(&block, &txids, &result.undo, &mut cache).unwrap();
        prop_assert_eq!(cache.best_block(), Some(prev_hash));
        for (outpoint, coin, _) in &funded {
            let restored = cache.get_coin(outpoint).unwrap();
            prop_assert_eq!(restored.as_ref(), Some(coin));
        }
        // Nothing the block created survives.
        let coinbase_out = OutPoint { txid: txids[0], index: 0 };
        prop_assert!(cache.get_coin(&coinbase_out).unwrap().is_none());
        for txid in &txids[1..] {
            let spend_out = OutPoint { txid: *txid, index: 0 };
            prop_assert!(cache.get_coin(&spend_out).unwrap().is_none());
        }
    }

    // ---------------------------------------------------------------
    // Fork choice is a deterministic function of the candidate set:
    // insertion order never changes the winner, and the winner is
    // the highest-work, earliest-seen key.
    // ---------------------------------------------------------------
    #[test]
    fn candidate_order_is_insertion_independent(
        entries in prop::collection::vec((0u128..1_000, 0u64..1_000), 1..32),
    ) {
        let keys: Vec<CandidateKey> = entries
            .iter()
            .enumerate()
            .map(|(i, (chain_work, sequence))| CandidateKey {
                chain_work: *chain_work,
                sequence: *sequence,
                hash: Hash256([i as u8; 32]),
            })
            .collect();

        let mut forward = CandidateSet::new();
        let mut backward = CandidateSet::new();
        for key in &keys {
            forward.add(*key);
        }
        for key in keys.iter().rev() {
            backward.add(*key);
        }
        let best = *forward.best().unwrap();
        prop_assert_eq!(Some(&best), backward.best());

        for key in &keys {
            prop_assert!(key.chain_work <= best.chain_work);
            if key.chain_work == best.chain_work {
                prop_assert!(best.sequence <= key.sequence);
            }
        }
    }

    // ---------------------------------------------------------------
    // Whatever mix of conflicting transactions is thrown at the pool,
    // each outpoint is locked by at most one resident transaction.
    // ---------------------------------------------------------------
    #[test]
    fn pool_outpoints_stay_exclusive(
        txs in prop::collection::vec(
            (prop::collection::vec((0u8..5, 0u32..2), 1..3), 5_000u64..50_000),
            1..24,
        ),
    ) {
        let mut pool = Mempool::with_defaults();
        for (seed, (inputs, value)) in txs.into_iter().enumerate() {
            let tx = Transaction {
                version: 1,
                kind: TxKind::Transfer,
                inputs: inputs
                    .into_iter()
                    .map(|(tag, index)| TxInput {
                        previous_output: OutPoint { txid: Hash256([tag; 32]), index: index.into() },
                        signature: vec![0; 64],
                        public_key: vec![0; 32],
                    })
                    .collect(),
                outputs: vec![TxOutput { value, pubkey_hash: pkh(seed as u8) }],
                lock_time: 0,
            };
            let _ = pool.insert(tx, MIN_TX_FEE, 100);
        }

        let resident = pool.select_transactions(usize::MAX);
        let mut seen = std::collections::HashSet::new();
        for entry in &resident {
            for input in &entry.tx.inputs {
                prop_assert!(
                    seen.insert(input.previous_output),
                    "outpoint {} locked twice", input.previous_output
                );
            }
        }
    }

    // ---------------------------------------------------------------
    // The emission schedule halves cleanly and never increases.
    // ---------------------------------------------------------------
    #[test]
    fn subsidy_halves_and_never_grows(height in 0u64..HALVING_INTERVAL * 62) {
        let params = ChainParams::regtest();
        prop_assert_eq!(
            params.subsidy(height + HALVING_INTERVAL),
            params.subsidy(height) / 2
        );
        prop_assert!(params.subsidy(height + 1) <= params.subsidy(height));
    }
}

// Signed spends must verify inside connect; a corrupted signature in an
// otherwise valid block is the canonical failure the parallel batch exists
// to catch. This one lives outside proptest because the interesting input
// is a single bit flip, not a distribution.
#[test]
fn tampered_signature_fails_connection() {
    let params = ChainParams::regtest();
    let owner_key = key(11);
    let owner = owner_key.public_key().pubkey_hash();
    let prev_hash = Hash256([0x01; 32]);

    let mut cache = CoinsCache::new(Arc::new(MemoryCoins::new())).unwrap();
    cache.set_best_block(prev_hash);
    let outpoint = OutPoint { txid: Hash256([9; 32]), index: 0 };
    cache
        .add_coin(outpoint, Coin {
            output: TxOutput { value: 50_000, pubkey_hash: owner },
            height: 0,
            origin: CoinOrigin::Transfer,
        })
        .unwrap();

    let mut spend = signed_spend(outpoint, &owner_key, 50_000 - MIN_TX_FEE, pkh(0xEE));
    spend.inputs[0].signature[0] ^= 0x01;
    let transactions = vec![
        coinbase_paying(params.subsidy(5) + MIN_TX_FEE, pkh(0xCB)),
        spend,
    ];
    let txids: Vec<Hash256> = transactions.iter().map(|tx| tx.txid().unwrap()).collect();
    let block = Block {
        header: BlockHeader {
            version: 1,
            prev_hash,
            merkle_root: merkle::merkle_root(&txids),
            timestamp: 1,
            target: u64::MAX,
            nonce: 0,
        },
        transactions,
    };

    assert!(apply::connect_block(&block, &txids, 5, &mut cache, &params).is_err());
    // The failed connection must not have touched the cache.
    assert!(cache.have_coin(&outpoint).unwrap());
    assert_eq!(cache.best_block(), Some(prev_hash));
}
