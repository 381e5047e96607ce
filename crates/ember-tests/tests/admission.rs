//! Mempool admission, package limits, and eviction.
//!
//! The raw [`Mempool`] tests fabricate unsigned transactions; signature and
//! coin checks happen upstream of the pool, so admission here exercises only
//! the pool's own rules.

use ember_chain::mempool::{
    MAX_ANCESTORS, Mempool, RemovalReason,
};
use ember_core::error::{EmberError, MempoolError, TxError};
use ember_core::genesis;
use ember_core::params::{ChainParams, MIN_TX_FEE};
use ember_core::types::*;
use ember_tests::helpers::*;

/// Unsigned transfer spending `inputs`, paying `outputs` to throwaway keys.
fn plain_tx(inputs: Vec<OutPoint>, outputs: Vec<u64>, tag: u8) -> Transaction {
    Transaction {
        version: 1,
        kind: TxKind::Transfer,
        inputs: inputs
            .into_iter()
            .map(|previous_output| TxInput {
                previous_output,
                signature: vec![0; 64],
                public_key: vec![0; 32],
            })
            .collect(),
        outputs: outputs
            .into_iter()
            .map(|value| TxOutput { value, pubkey_hash: pkh(tag) })
            .collect(),
        lock_time: 0,
    }
}

fn confirmed(tag: u8) -> OutPoint {
    OutPoint { txid: Hash256([tag; 32]), index: 0 }
}

// --- Pool rules ---

#[test]
fn ancestor_chain_is_capped() {
    let mut pool = Mempool::with_defaults();

    let mut parent = confirmed(0xC0);
    for i in 0..MAX_ANCESTORS {
        let tx = plain_tx(vec![parent], vec![50_000], i as u8);
        let txid = tx.txid().unwrap();
        pool.insert(tx, MIN_TX_FEE, 100).unwrap();
        parent = OutPoint { txid, index: 0 };
    }

    // Link 26 deep fails; the same tx on a fresh confirmed input is fine.
    let over = plain_tx(vec![parent], vec![40_000], 0xFF);
    match pool.insert(over, MIN_TX_FEE, 100) {
        Err(MempoolError::TooManyAncestors { count, limit }) => {
            assert_eq!(count, MAX_ANCESTORS + 1);
            assert_eq!(limit, MAX_ANCESTORS);
        }
        other => panic!("expected TooManyAncestors, got {other:?}"),
    }
    let fresh = plain_tx(vec![confirmed(0xC1)], vec![40_000], 0xFF);
    pool.insert(fresh, MIN_TX_FEE, 100).unwrap();
}

#[test]
fn conflicting_spend_is_rejected() {
    let mut pool = Mempool::with_defaults();
    let shared = confirmed(0xC0);

    pool.insert(plain_tx(vec![shared], vec![10_000], 1), MIN_TX_FEE, 100).unwrap();
    let rival = plain_tx(vec![shared], vec![20_000], 2);
    assert!(matches!(
        pool.insert(rival, MIN_TX_FEE, 100),
        Err(MempoolError::Conflict { .. })
    ));
    assert_eq!(pool.len(), 1);
}

#[test]
fn expiry_takes_descendants_along() {
    let mut pool = Mempool::with_defaults();

    let old = plain_tx(vec![confirmed(1)], vec![10_000], 1);
    let old_txid = old.txid().unwrap();
    pool.insert(old, MIN_TX_FEE, 100).unwrap();

    // Child arrives much later but still hangs off the stale parent.
    let child = plain_tx(vec![OutPoint { txid: old_txid, index: 0 }], vec![5_000], 2);
    let child_txid = child.txid().unwrap();
    pool.insert(child, MIN_TX_FEE, 10_000).unwrap();

    let fresh = plain_tx(vec![confirmed(2)], vec![10_000], 3);
    let fresh_txid = fresh.txid().unwrap();
    pool.insert(fresh, MIN_TX_FEE, 10_000).unwrap();

    let removed = pool.expire(10_100, 1_000);
    let reasons: Vec<(Hash256, RemovalReason)> =
        removed.iter().map(|(e, r)| (e.txid, *r)).collect();
    assert!(reasons.contains(&(old_txid, RemovalReason::Expired)));
    assert!(reasons.iter().any(|(id, r)| *id == child_txid && *r == RemovalReason::Conflicted));
    assert!(pool.contains(&fresh_txid));
    assert_eq!(pool.len(), 1);
}

#[test]
fn full_pool_evicts_the_cheapest_stranger() {
    let mut pool = Mempool::new(2, usize::MAX);

    let cheap = plain_tx(vec![confirmed(1)], vec![10_000], 1);
    let cheap_txid = cheap.txid().unwrap();
    pool.insert(cheap, MIN_TX_FEE, 100).unwrap();
    pool.insert(plain_tx(vec![confirmed(2)], vec![10_000], 2), MIN_TX_FEE * 5, 100).unwrap();

    // A better-paying transaction displaces the lowest fee rate entry.
    let (_, evicted) = pool
        .insert(plain_tx(vec![confirmed(3)], vec![10_000], 3), MIN_TX_FEE * 10, 100)
        .unwrap();
    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].0.txid, cheap_txid);
    assert_eq!(evicted[0].1, RemovalReason::SizeLimit);
    assert_eq!(pool.len(), 2);
}

#[test]
fn eviction_never_orphans_the_newcomer() {
    let mut pool = Mempool::new(2, usize::MAX);

    // The newcomer's own parent is the cheapest entry; evicting it would
    // orphan the newcomer, so admission fails instead.
    let parent = plain_tx(vec![confirmed(1)], vec![10_000], 1);
    let parent_txid = parent.txid().unwrap();
    pool.insert(parent, MIN_TX_FEE, 100).unwrap();
    pool.insert(plain_tx(vec![confirmed(2)], vec![10_000], 2), MIN_TX_FEE * 5, 100).unwrap();

    let child = plain_tx(vec![OutPoint { txid: parent_txid, index: 0 }], vec![5_000], 3);
    assert!(matches!(
        pool.insert(child, MIN_TX_FEE * 10, 100),
        Err(MempoolError::PoolFull)
    ));
    assert!(pool.contains(&parent_txid));
}

#[test]
fn block_selection_orders_parents_first() {
    let mut pool = Mempool::with_defaults();

    let a = plain_tx(vec![confirmed(1)], vec![10_000], 1);
    let a_txid = a.txid().unwrap();
    let b = plain_tx(vec![OutPoint { txid: a_txid, index: 0 }], vec![5_000], 2);
    let b_txid = b.txid().unwrap();
    // Child pays a far better rate than its parent; it must still come after.
    pool.insert(a, MIN_TX_FEE, 100).unwrap();
    pool.insert(b, MIN_TX_FEE * 20, 100).unwrap();
    pool.insert(plain_tx(vec![confirmed(2)], vec![10_000], 3), MIN_TX_FEE * 3, 100).unwrap();

    let selected = pool.select_transactions(1_000_000);
    assert_eq!(selected.len(), 3);
    let pos = |txid: &Hash256| selected.iter().position(|e| e.txid == *txid).unwrap();
    assert!(pos(&a_txid) < pos(&b_txid));
}

#[test]
fn mined_and_conflicted_removal_reasons() {
    let params = ChainParams::regtest();
    let mut pool = Mempool::with_defaults();

    let shared = confirmed(0xC0);
    let mined = plain_tx(vec![confirmed(1)], vec![10_000], 1);
    let mined_txid = mined.txid().unwrap();
    let losing = plain_tx(vec![shared], vec![10_000], 2);
    let losing_txid = losing.txid().unwrap();
    let losing_child =
        plain_tx(vec![OutPoint { txid: losing_txid, index: 0 }], vec![5_000], 3);
    let losing_child_txid = losing_child.txid().unwrap();
    pool.insert(mined.clone(), MIN_TX_FEE, 100).unwrap();
    pool.insert(losing, MIN_TX_FEE, 100).unwrap();
    pool.insert(losing_child, MIN_TX_FEE, 100).unwrap();

    // The block mines `mined` and spends `shared` through a different tx.
    let rival = plain_tx(vec![shared], vec![9_000], 4);
    let genesis_header = genesis::genesis_block(&params).header;
    let block = child_block(&genesis_header, 1, pkh(0xAA), 0, vec![mined, rival], &params);

    let removed = pool.remove_for_block(&block);
    let reason_of = |txid: &Hash256| {
        removed.iter().find(|(e, _)| e.txid == *txid).map(|(_, r)| *r)
    };
    assert_eq!(reason_of(&mined_txid), Some(RemovalReason::Mined));
    assert_eq!(reason_of(&losing_txid), Some(RemovalReason::Conflicted));
    assert_eq!(reason_of(&losing_child_txid), Some(RemovalReason::Conflicted));
    assert!(pool.is_empty());
}

// --- Admission through the chain manager ---

#[test]
fn unsigned_submission_is_rejected() {
    let params = ChainParams::regtest();
    let genesis_header = genesis::genesis_block(&params).header;
    let manager = new_manager(params.clone());

    let owner_key = key(9);
    let b1 = child_block(&genesis_header, 1, owner_key.public_key().pubkey_hash(), 0, vec![], &params);
    let funded = OutPoint { txid: b1.transactions[0].txid().unwrap(), index: 0 };
    let b1_header = b1.header;
    manager.accept_block(b1).unwrap();
    extend_chain(&manager, &b1_header, 2, 15, &params);

    let mut spend = signed_spend(funded, &owner_key, params.subsidy(1) - MIN_TX_FEE, pkh(1));
    spend.inputs[0].signature = vec![0; 64];
    let err = manager.submit_transaction(spend).unwrap_err();
    assert!(matches!(
        err,
        EmberError::Mempool(MempoolError::Tx(TxError::InvalidSignature { .. }))
    ));
    assert_eq!(manager.mempool_len(), 0);
}

#[test]
fn immature_coinbase_cannot_be_spent() {
    let params = ChainParams::regtest();
    let genesis_header = genesis::genesis_block(&params).header;
    let manager = new_manager(params.clone());

    let owner_key = key(9);
    let b1 = child_block(&genesis_header, 1, owner_key.public_key().pubkey_hash(), 0, vec![], &params);
    let funded = OutPoint { txid: b1.transactions[0].txid().unwrap(), index: 0 };
    manager.accept_block(b1).unwrap();

    // Only 1 confirmation; regtest maturity is 15.
    let spend = signed_spend(funded, &owner_key, params.subsidy(1) - MIN_TX_FEE, pkh(1));
    let err = manager.submit_transaction(spend).unwrap_err();
    assert!(matches!(
        err,
        EmberError::Mempool(MempoolError::Tx(TxError::ImmatureCoin { .. }))
    ));
}

#[test]
fn pool_outputs_fund_chained_submissions() {
    let params = ChainParams::regtest();
    let genesis_header = genesis::genesis_block(&params).header;
    let manager = new_manager(params.clone());

    let owner_key = key(9);
    let b1 = child_block(&genesis_header, 1, owner_key.public_key().pubkey_hash(), 0, vec![], &params);
    let funded = OutPoint { txid: b1.transactions[0].txid().unwrap(), index: 0 };
    let b1_header = b1.header;
    manager.accept_block(b1).unwrap();
    extend_chain(&manager, &b1_header, 2, 15, &params);

    // Spend the coinbase to ourselves, then spend the unconfirmed output.
    let hop_key = key(10);
    let first = signed_spend(
        funded,
        &owner_key,
        params.subsidy(1) - MIN_TX_FEE,
        hop_key.public_key().pubkey_hash(),
    );
    let first_txid = manager.submit_transaction(first).unwrap();
    let second = signed_spend(
        OutPoint { txid: first_txid, index: 0 },
        &hop_key,
        params.subsidy(1) - 2 * MIN_TX_FEE,
        pkh(0xEE),
    );
    let second_txid = manager.submit_transaction(second).unwrap();

    assert!(manager.mempool_contains(&first_txid));
    assert!(manager.mempool_contains(&second_txid));
    // Selection keeps the dependency order.
    let template = manager.template_transactions();
    assert_eq!(template.len(), 2);
    assert_eq!(template[0].0.txid().unwrap(), first_txid);
    assert_eq!(template[1].0.txid().unwrap(), second_txid);
}
