//! Chain selection and state orchestration.
//!
//! [`ChainManager`] ties the pieces together: the block index tree, the
//! active chain, the fork-choice candidate set, the coin cache, and the
//! mempool, all behind one `parking_lot::Mutex`. Blocks come in through
//! [`accept_block`](ChainManager::accept_block), transactions through
//! [`submit_transaction`](ChainManager::submit_transaction), and
//! [`activate_best_chain`](ChainManager::activate_best_chain) moves the tip
//! to the best candidate, reorganizing as needed.
//!
//! Reorganizations disconnect to the fork point and reconnect in batches of
//! at most [`MAX_CONNECT_BATCH`] blocks, releasing the lock between batches
//! so readers are never starved by a long catch-up. Listener callbacks fire
//! only after the lock is released.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use ember_core::block_validation::{self, HeaderContext};
use ember_core::error::{BlockError, ChainError, EmberError, MempoolError, TxError};
use ember_core::genesis;
use ember_core::params::{ChainParams, MAX_BLOCK_SIZE};
use ember_core::types::{Block, Coin, CoinOrigin, Hash256, OutPoint, Transaction};
use ember_core::validation;

use crate::apply;
use crate::block_index::{BlockIndex, BlockStatus};
use crate::candidates::{CandidateKey, CandidateSet};
use crate::chain::ActiveChain;
use crate::coins::{CoinsBackend, CoinsCache};
use crate::mempool::{Mempool, RemovalReason, DEFAULT_EXPIRY_SECS};
use crate::notify::{ChainNotifications, NotificationSink};
use crate::spends::SpentIndex;
use crate::store::{BlockStore, StoredIndexEntry};

/// Blocks connected per critical section during activation.
pub const MAX_CONNECT_BATCH: usize = 32;

/// Default byte budget for the coin cache overlay. Exceeding it during
/// activation forces a flush before the batch completes.
pub const DEFAULT_COIN_CACHE_BUDGET: usize = 32 * 1024 * 1024;

/// A tip older than this against local time means we are still syncing.
const INITIAL_SYNC_HORIZON: u64 = 24 * 60 * 60;

fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// The state the mutex guards.
struct ChainInner {
    index: BlockIndex,
    chain: ActiveChain,
    candidates: CandidateSet,
    coins: CoinsCache,
    mempool: Mempool,
    spends: SpentIndex,
}

/// Listener callbacks queued inside the lock, dispatched after release.
enum Event {
    Connected(Block, u64),
    Disconnected(Block, u64),
    Tip(Hash256, u64, Option<Hash256>, bool),
    Removed(Hash256, RemovalReason),
}

/// Summary of the active tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TipInfo {
    pub hash: Hash256,
    pub height: u64,
    pub chain_work: u128,
}

/// The validation engine's front door.
pub struct ChainManager {
    inner: Mutex<ChainInner>,
    store: Arc<dyn BlockStore>,
    params: ChainParams,
    listeners: Mutex<NotificationSink>,
    shutdown: AtomicBool,
    /// Mempool entries older than this many seconds are swept by
    /// [`expire_mempool`](ChainManager::expire_mempool).
    mempool_expiry_secs: u64,
    /// Coin cache byte budget; going over it flushes mid-batch.
    coin_cache_budget: usize,
}

impl ChainManager {
    /// Open a chain over the given coin backend and block store.
    ///
    /// An empty store is initialized with the network's genesis block.
    /// Otherwise the index, candidate set, and active chain are rebuilt from
    /// the stored entries and the coin store's best-block marker; a marker
    /// that does not name a fully validated indexed block is corruption.
    pub fn new(
        params: ChainParams,
        backend: Arc<dyn CoinsBackend>,
        store: Arc<dyn BlockStore>,
    ) -> Result<Self, EmberError> {
        Self::with_coin_cache_budget(params, backend, store, DEFAULT_COIN_CACHE_BUDGET)
    }

    /// [`new`](ChainManager::new) with an explicit coin cache byte budget.
    pub fn with_coin_cache_budget(
        params: ChainParams,
        backend: Arc<dyn CoinsBackend>,
        store: Arc<dyn BlockStore>,
        coin_cache_budget: usize,
    ) -> Result<Self, EmberError> {
        let mut coins = CoinsCache::new(backend).map_err(EmberError::Chain)?;
        let genesis_block = genesis::genesis_block(&params);
        let genesis_hash = genesis_block.header.hash();

        let mut index = BlockIndex::new();
        let mut chain = ActiveChain::new();
        let mut candidates = CandidateSet::new();

        let stored = store.index_entries().map_err(EmberError::Chain)?;
        if stored.is_empty() {
            store.put_block(&genesis_hash, &genesis_block).map_err(EmberError::Chain)?;
            store
                .put_index_entry(&StoredIndexEntry {
                    header: genesis_block.header,
                    status: BlockStatus::ScriptsValid,
                    failed: false,
                })
                .map_err(EmberError::Chain)?;
            index.insert_genesis(genesis_block.header);
            chain.push(genesis_hash);
            if coins.best_block().is_none() {
                coins.set_best_block(genesis_hash);
                coins.flush().map_err(EmberError::Chain)?;
            }
            info!(network = %params.network, hash = %genesis_hash, "initialized chain at genesis");
        } else {
            rebuild_index(&mut index, &stored, &genesis_hash)?;
            for entry in index.iter() {
                if !entry.failed && entry.is_valid_at_least(BlockStatus::TransactionsValid) {
                    candidates.add(CandidateKey {
                        chain_work: entry.chain_work,
                        sequence: entry.sequence,
                        hash: entry.hash,
                    });
                }
            }
            let marker = coins.best_block().unwrap_or(genesis_hash);
            rebuild_active_chain(&mut chain, &index, &marker, &genesis_hash)?;
            if coins.best_block().is_none() {
                coins.set_best_block(genesis_hash);
            }
            info!(
                blocks = index.len(),
                height = chain.height().unwrap_or(0),
                "loaded chain state"
            );
        }

        let manager = Self {
            inner: Mutex::new(ChainInner {
                index,
                chain,
                candidates,
                coins,
                mempool: Mempool::with_defaults(),
                spends: SpentIndex::new(params.max_reorg_depth),
            }),
            store,
            params,
            listeners: Mutex::new(NotificationSink::new()),
            shutdown: AtomicBool::new(false),
            mempool_expiry_secs: DEFAULT_EXPIRY_SECS,
            coin_cache_budget,
        };
        manager.activate_best_chain()?;
        Ok(manager)
    }

    /// Subscribe to chain events. Register before feeding blocks; events are
    /// not replayed.
    pub fn register_listener(&self, listener: Arc<dyn ChainNotifications>) {
        self.listeners.lock().register(listener);
    }

    /// Ask activation to stop at the next batch boundary.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Accept a block into the index and try to advance the tip.
    ///
    /// Runs structural and contextual validation; coin-dependent checks
    /// happen during activation. A block that fails activation is marked
    /// failed in the index but `accept_block` still returns its hash, since
    /// acceptance into the tree succeeded.
    pub fn accept_block(&self, block: Block) -> Result<Hash256, EmberError> {
        let hash = block.header.hash();
        {
            let mut guard = self.inner.lock();
            if guard.index.contains(&hash) {
                return Err(ChainError::DuplicateBlock(hash.to_string()).into());
            }
            let parent = guard
                .index
                .get(&block.header.prev_hash)
                .ok_or_else(|| BlockError::UnknownParent(block.header.prev_hash.to_string()))?;
            if parent.failed {
                return Err(BlockError::BadAncestor(parent.hash.to_string()).into());
            }
            let ctx = HeaderContext {
                height: parent.height + 1,
                prev_timestamp: parent.header.timestamp,
                current_time: unix_time(),
            };
            block_validation::validate_block(&block, &ctx, &self.params)
                .map_err(EmberError::Block)?;

            let entry = guard.index.insert(block.header).map_err(EmberError::Chain)?;
            let key = CandidateKey {
                chain_work: entry.chain_work,
                sequence: entry.sequence,
                hash,
            };
            let height = entry.height;
            guard.index.advance_status(&hash, BlockStatus::ChainContextValid);
            self.store.put_block(&hash, &block).map_err(EmberError::Chain)?;
            self.store
                .put_index_entry(&StoredIndexEntry {
                    header: block.header,
                    status: BlockStatus::ChainContextValid,
                    failed: false,
                })
                .map_err(EmberError::Chain)?;
            guard.candidates.add(key);
            debug!(%hash, height, "accepted block");
        }
        self.activate_best_chain()?;
        Ok(hash)
    }

    /// Validate a loose transaction and admit it to the mempool.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<Hash256, EmberError> {
        let mut events = Vec::new();
        let result = {
            let mut guard = self.inner.lock();
            let next_height = guard.chain.height().map_or(1, |h| h + 1);
            let now = unix_time();
            let ChainInner { coins, mempool, .. } = &mut *guard;

            let validated = validation::validate_transaction(
                &tx,
                |outpoint| resolve_coin(mempool, coins, outpoint, next_height),
                next_height,
                now,
                &self.params,
            )
            .map_err(|e| match e {
                TxError::UnknownCoin(s) => MempoolError::MissingInputs(s),
                other => MempoolError::Tx(other),
            })?;

            let (txid, evicted) = mempool.insert(tx, validated.fee, now)?;
            for (entry, reason) in evicted {
                events.push(Event::Removed(entry.txid, reason));
            }
            Ok(txid)
        };
        self.dispatch(events);
        result.map_err(EmberError::Mempool)
    }

    /// Move the tip to the best candidate, reorganizing if necessary.
    ///
    /// Idempotent; safe to call at any time. Works in batches, releasing the
    /// lock and dispatching queued notifications between them.
    pub fn activate_best_chain(&self) -> Result<(), EmberError> {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return Ok(());
            }
            let mut events = Vec::new();
            let step = {
                let mut guard = self.inner.lock();
                self.activation_step(&mut guard, &mut events)
            };
            self.dispatch(events);
            match step {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// One batched activation step. Returns `true` when the tip is already
    /// the best candidate and there is nothing left to do.
    fn activation_step(
        &self,
        guard: &mut ChainInner,
        events: &mut Vec<Event>,
    ) -> Result<bool, EmberError> {
        let tip_hash = match guard.chain.tip() {
            Some(h) => h,
            None => return Ok(true),
        };
        let tip_entry = guard
            .index
            .get(&tip_hash)
            .ok_or_else(|| ChainError::BlockNotFound(tip_hash.to_string()))?;
        let tip_work = tip_entry.chain_work;
        let tip_height = tip_entry.height;

        let best = match guard.candidates.best().copied() {
            Some(b) => b,
            None => return Ok(true),
        };
        if best.hash == tip_hash || best.chain_work <= tip_work {
            guard.candidates.prune_below(tip_work);
            return Ok(true);
        }

        let fork = guard
            .index
            .last_common_ancestor(&tip_hash, &best.hash)
            .ok_or_else(|| ChainError::BlockNotFound(best.hash.to_string()))?;
        let fork_hash = fork.hash;
        let fork_height = fork.height;

        let depth = tip_height - fork_height;
        if depth > self.params.max_reorg_depth {
            warn!(
                %tip_hash, candidate = %best.hash, depth,
                max = self.params.max_reorg_depth,
                "refusing deep reorganization"
            );
            guard.candidates.remove(&best);
            return Err(ChainError::DeepReorg { depth, max: self.params.max_reorg_depth }.into());
        }
        if depth > 0 {
            info!(
                from = %tip_hash, to = %best.hash, fork = %fork_hash, depth,
                "reorganizing"
            );
        }

        // Disconnect down to the fork point.
        let mut disconnected_txs: Vec<Transaction> = Vec::new();
        while guard.chain.tip() != Some(fork_hash) {
            let hash = match guard.chain.tip() {
                Some(h) => h,
                None => return Err(ChainError::BlockNotFound(fork_hash.to_string()).into()),
            };
            let height = guard.chain.height().unwrap_or(0);
            let block = self
                .store
                .block(&hash)
                .map_err(EmberError::Chain)?
                .ok_or_else(|| ChainError::BlockNotFound(hash.to_string()))?;
            let undo = self
                .store
                .undo(&hash)
                .map_err(EmberError::Chain)?
                .ok_or_else(|| ChainError::UndoDataMissing(hash.to_string()))?;
            let txids = block
                .txids()
                .map_err(|e| ChainError::Storage(format!("stored block {hash}: {e}")))?;
            apply::disconnect_block(&block, &txids, &undo, &mut guard.coins)
                .map_err(EmberError::Chain)?;
            guard.chain.pop();
            guard.spends.record_disconnect(height);
            if let Some(entry) = guard.index.get(&hash) {
                guard.candidates.add(CandidateKey {
                    chain_work: entry.chain_work,
                    sequence: entry.sequence,
                    hash,
                });
            }
            // Oldest block first once reversed, so dependencies precede
            // dependents at reinsertion.
            for tx in block.transactions.iter().skip(1).rev() {
                if !tx.is_coinstake() {
                    disconnected_txs.push(tx.clone());
                }
            }
            events.push(Event::Disconnected(block, height));
        }
        disconnected_txs.reverse();

        // Connect toward the candidate, one batch per step.
        let mut path = Vec::new();
        let mut cursor = best.hash;
        while cursor != fork_hash {
            let entry = guard
                .index
                .get(&cursor)
                .ok_or_else(|| ChainError::BlockNotFound(cursor.to_string()))?;
            path.push(cursor);
            cursor = entry.header.prev_hash;
        }
        path.reverse();

        for hash in path.iter().take(MAX_CONNECT_BATCH) {
            let height = guard
                .index
                .get(hash)
                .ok_or_else(|| ChainError::BlockNotFound(hash.to_string()))?
                .height;
            let block = self
                .store
                .block(hash)
                .map_err(EmberError::Chain)?
                .ok_or_else(|| ChainError::BlockNotFound(hash.to_string()))?;
            let txids = block
                .txids()
                .map_err(|e| ChainError::Storage(format!("stored block {hash}: {e}")))?;

            match apply::connect_block(&block, &txids, height, &mut guard.coins, &self.params) {
                Ok(result) => {
                    self.store.put_undo(hash, &result.undo).map_err(EmberError::Chain)?;
                    guard.index.advance_status(hash, BlockStatus::ScriptsValid);
                    self.store
                        .put_index_entry(&StoredIndexEntry {
                            header: block.header,
                            status: BlockStatus::ScriptsValid,
                            failed: false,
                        })
                        .map_err(EmberError::Chain)?;
                    guard.chain.push(*hash);
                    let spent: Vec<OutPoint> = block
                        .transactions
                        .iter()
                        .skip(1)
                        .flat_map(|tx| tx.inputs.iter().map(|input| input.previous_output))
                        .collect();
                    guard.spends.record_connect(height, spent);
                    for (entry, reason) in guard.mempool.remove_for_block(&block) {
                        events.push(Event::Removed(entry.txid, reason));
                    }
                    events.push(Event::Connected(block, height));
                    // Undo data and the index entry are already durable at
                    // this point, so the marker the flush carries names a
                    // fully validated block.
                    if guard.coins.memory_usage() > self.coin_cache_budget {
                        debug!(
                            %hash, height,
                            bytes = guard.coins.memory_usage(),
                            "coin cache over budget, flushing early"
                        );
                        guard.coins.flush().map_err(EmberError::Chain)?;
                    }
                }
                Err(EmberError::Block(e)) => {
                    warn!(%hash, height, error = %e, "block failed connection");
                    guard.index.mark_failed(hash);
                    // Descendants re-inherit the flag on reload, so only the
                    // root of the failed subtree is persisted.
                    self.store
                        .put_index_entry(&StoredIndexEntry {
                            header: block.header,
                            status: BlockStatus::ChainContextValid,
                            failed: true,
                        })
                        .map_err(EmberError::Chain)?;
                    let ChainInner { index, candidates, .. } = guard;
                    candidates.remove_matching(|h| {
                        index.get(h).map_or(true, |entry| entry.failed)
                    });
                    break;
                }
                Err(other) => return Err(other),
            }
        }

        // Put disconnected transactions back, now against the new tip.
        let new_next_height = guard.chain.height().map_or(1, |h| h + 1);
        let now = unix_time();
        let ChainInner { coins, mempool, .. } = guard;
        for tx in disconnected_txs {
            let validated = match validation::validate_transaction(
                &tx,
                |outpoint| resolve_coin(mempool, coins, outpoint, new_next_height),
                new_next_height,
                now,
                &self.params,
            ) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if let Ok((_, evicted)) = mempool.insert(tx, validated.fee, now) {
                for (entry, reason) in evicted {
                    events.push(Event::Removed(entry.txid, reason));
                }
            }
        }

        guard.coins.flush().map_err(EmberError::Chain)?;

        let new_tip = guard
            .chain
            .tip()
            .ok_or_else(|| ChainError::BlockNotFound(fork_hash.to_string()))?;
        let new_entry = guard
            .index
            .get(&new_tip)
            .ok_or_else(|| ChainError::BlockNotFound(new_tip.to_string()))?;
        guard.candidates.prune_below(new_entry.chain_work);
        if new_tip != tip_hash {
            let initial_sync =
                new_entry.header.timestamp.saturating_add(INITIAL_SYNC_HORIZON) < unix_time();
            let fork_point = (depth > 0).then_some(fork_hash);
            info!(hash = %new_tip, height = new_entry.height, "tip updated");
            events.push(Event::Tip(new_tip, new_entry.height, fork_point, initial_sync));
        }
        // More work may remain (long path or restart after a failure).
        Ok(guard.candidates.best().map_or(true, |b| {
            b.hash == new_tip || b.chain_work <= new_entry.chain_work
        }))
    }

    /// Sweep expired mempool entries against the local clock.
    pub fn expire_mempool(&self) {
        let mut events = Vec::new();
        {
            let mut guard = self.inner.lock();
            for (entry, reason) in guard.mempool.expire(unix_time(), self.mempool_expiry_secs) {
                events.push(Event::Removed(entry.txid, reason));
            }
        }
        self.dispatch(events);
    }

    // --- Queries ---

    pub fn tip(&self) -> Result<TipInfo, ChainError> {
        let guard = self.inner.lock();
        let hash = guard
            .chain
            .tip()
            .ok_or_else(|| ChainError::BlockNotFound("empty chain".into()))?;
        let entry = guard
            .index
            .get(&hash)
            .ok_or_else(|| ChainError::BlockNotFound(hash.to_string()))?;
        Ok(TipInfo { hash, height: entry.height, chain_work: entry.chain_work })
    }

    pub fn get_coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, ChainError> {
        self.inner.lock().coins.get_coin(outpoint)
    }

    /// Height of the block that spent `outpoint`.
    ///
    /// Covers spends within the trailing reorganization window; `None`
    /// means unspent, or spent longer ago than the window reaches.
    pub fn get_spend_height(&self, outpoint: &OutPoint) -> Option<u64> {
        self.inner.lock().spends.spend_height(outpoint)
    }

    pub fn block_hash_at(&self, height: u64) -> Option<Hash256> {
        self.inner.lock().chain.hash_at(height)
    }

    /// Header of an indexed block.
    pub fn header(&self, hash: &Hash256) -> Option<ember_core::types::BlockHeader> {
        self.inner.lock().index.get(hash).map(|entry| entry.header)
    }

    /// Validation status and failure flag of an indexed block.
    pub fn block_status(&self, hash: &Hash256) -> Option<(BlockStatus, bool)> {
        self.inner
            .lock()
            .index
            .get(hash)
            .map(|entry| (entry.status, entry.failed))
    }

    pub fn contains_block(&self, hash: &Hash256) -> bool {
        self.inner.lock().index.contains(hash)
    }

    pub fn mempool_contains(&self, txid: &Hash256) -> bool {
        self.inner.lock().mempool.contains(txid)
    }

    pub fn mempool_len(&self) -> usize {
        self.inner.lock().mempool.len()
    }

    /// Highest-fee-rate mempool transactions fitting a block, in valid
    /// topological order, each with its fee.
    pub fn template_transactions(&self) -> Vec<(Transaction, u64)> {
        let guard = self.inner.lock();
        guard
            .mempool
            .select_transactions(MAX_BLOCK_SIZE / 2)
            .into_iter()
            .map(|entry| (entry.tx.clone(), entry.fee))
            .collect()
    }

    fn dispatch(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        let sink = self.listeners.lock().clone();
        for event in events {
            match event {
                Event::Connected(block, height) => sink.block_connected(&block, height),
                Event::Disconnected(block, height) => sink.block_disconnected(&block, height),
                Event::Tip(hash, height, fork_point, initial_sync) => {
                    sink.tip_updated(&hash, height, fork_point, initial_sync)
                }
                Event::Removed(txid, reason) => sink.transaction_removed(&txid, reason),
            }
        }
    }
}

/// Resolve an outpoint against unconfirmed pool outputs first, then the
/// coin view. Pool outputs count as created at the next height. Backend
/// read faults read as missing here; admission is not a consensus path.
fn resolve_coin(
    mempool: &Mempool,
    coins: &CoinsCache,
    outpoint: &OutPoint,
    next_height: u64,
) -> Option<Coin> {
    if let Some(output) = mempool.get_output(outpoint) {
        return Some(Coin {
            output: output.clone(),
            height: next_height,
            origin: CoinOrigin::Transfer,
        });
    }
    coins.get_coin(outpoint).ok().flatten()
}

/// Rebuild the in-memory index tree from stored entries.
fn rebuild_index(
    index: &mut BlockIndex,
    stored: &[StoredIndexEntry],
    genesis_hash: &Hash256,
) -> Result<(), EmberError> {
    let genesis_entry = stored
        .iter()
        .find(|e| e.header.hash() == *genesis_hash)
        .ok_or_else(|| ChainError::Storage("stored index has no genesis entry".into()))?;
    index.insert_genesis(genesis_entry.header);

    let mut pending: Vec<&StoredIndexEntry> =
        stored.iter().filter(|e| e.header.hash() != *genesis_hash).collect();
    let mut failed_roots: Vec<Hash256> = Vec::new();
    loop {
        let before = pending.len();
        pending.retain(|entry| {
            if !index.contains(&entry.header.prev_hash) {
                return true;
            }
            let hash = entry.header.hash();
            match index.insert(entry.header) {
                Ok(_) => {
                    index.advance_status(&hash, entry.status);
                    if entry.failed {
                        failed_roots.push(hash);
                    }
                    false
                }
                Err(e) => {
                    warn!(%hash, error = %e, "dropping unloadable index entry");
                    false
                }
            }
        });
        if pending.is_empty() || pending.len() == before {
            break;
        }
    }
    if !pending.is_empty() {
        warn!(orphaned = pending.len(), "dropping index entries with missing parents");
    }
    for hash in failed_roots {
        index.mark_failed(&hash);
    }
    Ok(())
}

/// Rebuild the active chain by walking back from the best-block marker.
fn rebuild_active_chain(
    chain: &mut ActiveChain,
    index: &BlockIndex,
    marker: &Hash256,
    genesis_hash: &Hash256,
) -> Result<(), EmberError> {
    let tip = index.get(marker).ok_or_else(|| {
        ChainError::Storage(format!("best-block marker {marker} is not indexed"))
    })?;
    if tip.failed || !tip.is_valid_at_least(BlockStatus::ScriptsValid) {
        return Err(ChainError::Storage(format!(
            "best-block marker {marker} names a block that is not fully validated"
        ))
        .into());
    }

    let mut hashes = Vec::with_capacity(tip.height as usize + 1);
    let mut cursor = *marker;
    loop {
        hashes.push(cursor);
        if cursor == *genesis_hash {
            break;
        }
        let entry = index.get(&cursor).ok_or_else(|| {
            ChainError::Storage(format!("active chain walks off the index at {cursor}"))
        })?;
        cursor = entry.header.prev_hash;
    }
    for hash in hashes.into_iter().rev() {
        chain.push(hash);
    }
    Ok(())
}
