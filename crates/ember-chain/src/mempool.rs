//! In-memory pool of unconfirmed transactions.
//!
//! The pool stores validated transactions awaiting inclusion in blocks:
//! - O(1) lookup by txid
//! - O(1) conflict detection via a spent-outpoint index
//! - O(log n) fee-rate-ordered selection for block templates
//! - parent/child links for ancestor and descendant package limits
//! - byte-budgeted storage with lowest-fee-rate eviction
//!
//! Contextual validation (inputs, signatures, finality) happens in the
//! chain manager before insertion; the pool enforces duplicates, conflicts,
//! package limits, and capacity. Every removal carries a
//! [`RemovalReason`] so listeners can tell a mined transaction from an
//! evicted one.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

use ember_core::error::{MempoolError, TxError};
use ember_core::params::MIN_TX_FEE;
use ember_core::types::{Block, Hash256, OutPoint, Transaction, TxOutput};

/// Default maximum number of transactions in the pool.
pub const DEFAULT_MAX_COUNT: usize = 5_000;

/// Default maximum total serialized bytes in the pool (5 MiB).
pub const DEFAULT_MAX_BYTES: usize = 5 * 1024 * 1024;

/// Maximum in-pool ancestors a transaction may have, itself included.
pub const MAX_ANCESTORS: usize = 25;

/// Maximum total serialized bytes of a transaction plus its in-pool ancestors.
pub const MAX_ANCESTOR_BYTES: usize = 101_000;

/// Maximum in-pool descendants any ancestor may accumulate, itself included.
pub const MAX_DESCENDANTS: usize = 25;

/// Maximum total serialized bytes of an ancestor plus its in-pool descendants.
pub const MAX_DESCENDANT_BYTES: usize = 101_000;

/// Default expiry horizon for pool entries (two weeks).
pub const DEFAULT_EXPIRY_SECS: u64 = 14 * 24 * 60 * 60;

/// Fee rate precision multiplier.
///
/// Fee rate is stored as `fee * FEE_RATE_PRECISION / size`, giving
/// milli-sparks per byte for fine-grained ordering.
const FEE_RATE_PRECISION: u128 = 1_000;

fn compute_fee_rate(fee: u64, size: usize) -> u64 {
    if size == 0 {
        return u64::MAX;
    }
    let rate = (fee as u128) * FEE_RATE_PRECISION / (size as u128);
    rate.min(u64::MAX as u128) as u64
}

/// Why a transaction left the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Included in a connected block.
    Mined,
    /// An input was spent by a connected block or a removed ancestor.
    Conflicted,
    /// Sat in the pool past the expiry horizon.
    Expired,
    /// Displaced by a reorganization.
    Replaced,
    /// Evicted to stay under the byte budget.
    SizeLimit,
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Mined => "mined",
            Self::Conflicted => "conflicted",
            Self::Expired => "expired",
            Self::Replaced => "replaced",
            Self::SizeLimit => "size-limit",
        };
        f.write_str(s)
    }
}

/// A transaction stored in the pool with precomputed metadata.
#[derive(Debug, Clone)]
pub struct MempoolEntry {
    /// The unconfirmed transaction.
    pub tx: Transaction,
    /// Precomputed transaction ID.
    pub txid: Hash256,
    /// Transaction fee in sparks.
    pub fee: u64,
    /// Serialized size in bytes.
    pub size: usize,
    /// Unix time the entry was admitted.
    pub time: u64,
    /// In-pool transactions this entry spends outputs of.
    parents: HashSet<Hash256>,
    /// In-pool transactions spending this entry's outputs.
    children: HashSet<Hash256>,
    fee_rate: u64,
}

impl MempoolEntry {
    /// Fee rate in milli-sparks per byte.
    pub fn fee_rate(&self) -> u64 {
        self.fee_rate
    }

    /// Txids of in-pool parents.
    pub fn parents(&self) -> impl Iterator<Item = &Hash256> {
        self.parents.iter()
    }
}

/// In-memory pool of unconfirmed transactions.
///
/// Not thread-safe; the chain manager holds it behind its state lock.
pub struct Mempool {
    /// Primary storage: txid → entry.
    entries: HashMap<Hash256, MempoolEntry>,
    /// Spent outpoint → txid of the pool transaction that spends it.
    by_outpoint: HashMap<OutPoint, Hash256>,
    /// Ascending `(fee_rate, txid)`: lowest first for eviction, iterate in
    /// reverse for block templates.
    by_fee_rate: BTreeSet<(u64, Hash256)>,
    max_count: usize,
    max_bytes: usize,
    total_bytes: usize,
}

impl Mempool {
    pub fn new(max_count: usize, max_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            by_outpoint: HashMap::new(),
            by_fee_rate: BTreeSet::new(),
            max_count,
            max_bytes,
            total_bytes: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MAX_COUNT, DEFAULT_MAX_BYTES)
    }

    /// Insert a contextually validated transaction into the pool.
    ///
    /// The caller has already run
    /// [`validate_transaction`](ember_core::validation::validate_transaction)
    /// and passes its fee. The pool checks duplicates, conflicts, the fee
    /// floor, ancestor and descendant package limits, and capacity. Entries
    /// evicted to make room are returned alongside the new txid so the
    /// caller can notify listeners.
    pub fn insert(
        &mut self,
        tx: Transaction,
        fee: u64,
        now: u64,
    ) -> Result<(Hash256, Vec<(MempoolEntry, RemovalReason)>), MempoolError> {
        if tx.is_coinbase() || tx.is_coinstake() {
            return Err(MempoolError::GeneratedTx);
        }
        if fee < MIN_TX_FEE {
            return Err(MempoolError::FeeTooLow { fee, minimum: MIN_TX_FEE });
        }

        // One serialization gives both txid and size.
        let encoded = bincode::encode_to_vec(&tx, bincode::config::standard())
            .map_err(|e| TxError::Serialization(e.to_string()))?;
        let txid = Hash256(blake3::hash(&encoded).into());
        let size = encoded.len();

        if self.entries.contains_key(&txid) {
            return Err(MempoolError::AlreadyKnown(txid.to_string()));
        }

        for input in &tx.inputs {
            if let Some(conflicting) = self.by_outpoint.get(&input.previous_output) {
                return Err(MempoolError::Conflict {
                    new_txid: txid.to_string(),
                    existing_txid: conflicting.to_string(),
                    outpoint: input.previous_output.to_string(),
                });
            }
        }

        let parents: HashSet<Hash256> = tx
            .inputs
            .iter()
            .map(|input| input.previous_output.txid)
            .filter(|parent| self.entries.contains_key(parent))
            .collect();

        let ancestors = self.ancestors_of(&parents);
        let ancestor_count = ancestors.len() + 1;
        if ancestor_count > MAX_ANCESTORS {
            return Err(MempoolError::TooManyAncestors {
                count: ancestor_count,
                limit: MAX_ANCESTORS,
            });
        }
        let ancestor_bytes: usize =
            size + ancestors.iter().filter_map(|a| self.entries.get(a)).map(|e| e.size).sum::<usize>();
        if ancestor_bytes > MAX_ANCESTOR_BYTES {
            return Err(MempoolError::AncestorSizeExceeded {
                size: ancestor_bytes,
                limit: MAX_ANCESTOR_BYTES,
            });
        }

        // The new entry joins every ancestor's descendant package.
        for ancestor in &ancestors {
            let (count, bytes) = self.descendant_package(ancestor);
            if count + 1 > MAX_DESCENDANTS {
                return Err(MempoolError::TooManyDescendants {
                    count: count + 1,
                    limit: MAX_DESCENDANTS,
                });
            }
            if bytes + size > MAX_DESCENDANT_BYTES {
                return Err(MempoolError::DescendantSizeExceeded {
                    size: bytes + size,
                    limit: MAX_DESCENDANT_BYTES,
                });
            }
        }

        let fee_rate = compute_fee_rate(fee, size);

        // Evict lowest-fee-rate packages while over capacity. The whole
        // eviction is planned before anything is removed, so a rejected
        // insert leaves the pool untouched. Never evict an ancestor of the
        // incoming transaction.
        let mut planned: HashSet<Hash256> = HashSet::new();
        let mut planned_roots: Vec<Hash256> = Vec::new();
        let mut freed_count = 0usize;
        let mut freed_bytes = 0usize;
        while self.entries.len() - freed_count >= self.max_count
            || self.total_bytes - freed_bytes + size > self.max_bytes
        {
            let Some(&(lowest_rate, lowest_txid)) =
                self.by_fee_rate.iter().find(|(_, id)| !planned.contains(id))
            else {
                return Err(MempoolError::PoolFull);
            };
            if lowest_rate >= fee_rate || ancestors.contains(&lowest_txid) {
                return Err(MempoolError::PoolFull);
            }
            planned_roots.push(lowest_txid);
            for id in self.subtree_of(lowest_txid) {
                if planned.insert(id) {
                    freed_count += 1;
                    freed_bytes += self.entries.get(&id).map_or(0, |e| e.size);
                }
            }
        }
        let mut evicted = Vec::new();
        for root in planned_roots {
            evicted.extend(self.remove_subtree(root, RemovalReason::SizeLimit));
        }

        for parent in &parents {
            if let Some(entry) = self.entries.get_mut(parent) {
                entry.children.insert(txid);
            }
        }
        for input in &tx.inputs {
            self.by_outpoint.insert(input.previous_output, txid);
        }
        self.by_fee_rate.insert((fee_rate, txid));
        self.total_bytes += size;
        self.entries.insert(
            txid,
            MempoolEntry {
                tx,
                txid,
                fee,
                size,
                time: now,
                parents,
                children: HashSet::new(),
                fee_rate,
            },
        );

        Ok((txid, evicted))
    }

    /// Remove a transaction and all in-pool descendants.
    pub fn remove(
        &mut self,
        txid: &Hash256,
        reason: RemovalReason,
    ) -> Vec<(MempoolEntry, RemovalReason)> {
        self.remove_subtree(*txid, reason)
    }

    /// Remove `txid` plus every descendant, descendants first.
    fn remove_subtree(
        &mut self,
        txid: Hash256,
        reason: RemovalReason,
    ) -> Vec<(MempoolEntry, RemovalReason)> {
        let order = self.subtree_of(txid);
        let mut removed = Vec::with_capacity(order.len());
        for id in order.into_iter().rev() {
            if let Some(entry) = self.remove_entry(id) {
                let entry_reason = if entry.txid == txid { reason } else { descendant_reason(reason) };
                removed.push((entry, entry_reason));
            }
        }
        removed
    }

    /// `txid` plus every in-pool descendant, breadth-first from the root.
    fn subtree_of(&self, txid: Hash256) -> Vec<Hash256> {
        let mut order = Vec::new();
        let mut queue = VecDeque::from([txid]);
        let mut seen = HashSet::from([txid]);
        while let Some(current) = queue.pop_front() {
            let Some(entry) = self.entries.get(&current) else { continue };
            order.push(current);
            for child in &entry.children {
                if seen.insert(*child) {
                    queue.push_back(*child);
                }
            }
        }
        order
    }

    fn remove_entry(&mut self, txid: Hash256) -> Option<MempoolEntry> {
        let entry = self.entries.remove(&txid)?;
        for input in &entry.tx.inputs {
            self.by_outpoint.remove(&input.previous_output);
        }
        for parent in &entry.parents {
            if let Some(parent_entry) = self.entries.get_mut(parent) {
                parent_entry.children.remove(&txid);
            }
        }
        self.by_fee_rate.remove(&(entry.fee_rate, txid));
        self.total_bytes -= entry.size;
        Some(entry)
    }

    /// All in-pool ancestors reachable from a parent set.
    fn ancestors_of(&self, parents: &HashSet<Hash256>) -> HashSet<Hash256> {
        let mut ancestors = HashSet::new();
        let mut queue: VecDeque<Hash256> = parents.iter().copied().collect();
        while let Some(current) = queue.pop_front() {
            if !ancestors.insert(current) {
                continue;
            }
            if let Some(entry) = self.entries.get(&current) {
                queue.extend(entry.parents.iter().copied());
            }
        }
        ancestors
    }

    /// Descendant package of `txid`: (count, bytes), the entry included.
    fn descendant_package(&self, txid: &Hash256) -> (usize, usize) {
        let mut count = 0usize;
        let mut bytes = 0usize;
        let mut seen = HashSet::from([*txid]);
        let mut queue = VecDeque::from([*txid]);
        while let Some(current) = queue.pop_front() {
            if let Some(entry) = self.entries.get(&current) {
                count += 1;
                bytes += entry.size;
                for child in &entry.children {
                    if seen.insert(*child) {
                        queue.push_back(*child);
                    }
                }
            }
        }
        (count, bytes)
    }

    pub fn contains(&self, txid: &Hash256) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn get(&self, txid: &Hash256) -> Option<&MempoolEntry> {
        self.entries.get(txid)
    }

    /// Look up an output created by a pool transaction.
    ///
    /// Used during admission to resolve inputs that spend unconfirmed
    /// parents before falling back to the coin store.
    pub fn get_output(&self, outpoint: &OutPoint) -> Option<&TxOutput> {
        self.entries
            .get(&outpoint.txid)?
            .tx
            .outputs
            .get(outpoint.index as usize)
    }

    /// Whether any input of `tx` is already spent by a pool transaction.
    pub fn has_conflict(&self, tx: &Transaction) -> bool {
        tx.inputs
            .iter()
            .any(|input| self.by_outpoint.contains_key(&input.previous_output))
    }

    /// Select transactions for a block template, highest fee rate first.
    ///
    /// Greedily fills up to `max_block_bytes`, admitting an entry only once
    /// all of its in-pool parents are selected, so the result is in valid
    /// topological order.
    pub fn select_transactions(&self, max_block_bytes: usize) -> Vec<&MempoolEntry> {
        let mut selected: Vec<&MempoolEntry> = Vec::new();
        let mut in_template: HashSet<Hash256> = HashSet::new();
        let mut remaining = max_block_bytes;

        loop {
            let mut progressed = false;
            for (_, txid) in self.by_fee_rate.iter().rev() {
                if in_template.contains(txid) {
                    continue;
                }
                let Some(entry) = self.entries.get(txid) else { continue };
                if entry.size > remaining {
                    continue;
                }
                if !entry.parents.iter().all(|p| in_template.contains(p)) {
                    continue;
                }
                in_template.insert(*txid);
                selected.push(entry);
                remaining -= entry.size;
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
        selected
    }

    /// Drop transactions confirmed or conflicted by a connected block.
    ///
    /// Mined transactions leave alone their in-pool children, whose inputs
    /// are now satisfied by the chain. Conflicted transactions take their
    /// descendants with them.
    pub fn remove_for_block(&mut self, block: &Block) -> Vec<(MempoolEntry, RemovalReason)> {
        let mut removed = Vec::new();

        for tx in &block.transactions {
            if let Ok(txid) = tx.txid() {
                if let Some(entry) = self.remove_entry(txid) {
                    removed.push((entry, RemovalReason::Mined));
                }
            }
        }

        let conflicted: Vec<Hash256> = block
            .transactions
            .iter()
            .flat_map(|tx| tx.inputs.iter())
            .filter(|input| !input.previous_output.is_null())
            .filter_map(|input| self.by_outpoint.get(&input.previous_output).copied())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        for txid in conflicted {
            removed.extend(self.remove_subtree(txid, RemovalReason::Conflicted));
        }

        removed
    }

    /// Sweep out entries older than `horizon_secs`, descendants included.
    pub fn expire(&mut self, now: u64, horizon_secs: u64) -> Vec<(MempoolEntry, RemovalReason)> {
        let stale: Vec<Hash256> = self
            .entries
            .values()
            .filter(|e| now.saturating_sub(e.time) > horizon_secs)
            .map(|e| e.txid)
            .collect();
        let mut removed = Vec::new();
        for txid in stale {
            removed.extend(self.remove_subtree(txid, RemovalReason::Expired));
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }
}

/// A removed entry's descendants go out as conflicted unless the whole
/// subtree shares the cause.
fn descendant_reason(reason: RemovalReason) -> RemovalReason {
    match reason {
        RemovalReason::Expired | RemovalReason::SizeLimit | RemovalReason::Replaced => reason,
        _ => RemovalReason::Conflicted,
    }
}
