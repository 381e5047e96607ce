//! In-memory block index.
//!
//! Every header this node has ever accepted lives in the index as a
//! [`BlockIndexEntry`], forming a tree rooted at genesis. Entries carry the
//! cumulative chain work, an arrival sequence number for fork-choice
//! tiebreaks, and a validity status that only moves forward.

use std::collections::HashMap;

use ember_core::error::ChainError;
use ember_core::types::{BlockHeader, Hash256};

/// How far a block has progressed through validation.
///
/// Statuses form a ladder; a block's status never moves down. Invalidity is
/// tracked separately by [`BlockIndexEntry::failed`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub enum BlockStatus {
    /// Header accepted into the tree; transactions unseen.
    HeaderOnly,
    /// Header contextually valid against its parent.
    TreeValid,
    /// Full block stored and structurally valid.
    TransactionsValid,
    /// All coin-dependent checks except signatures passed.
    ChainContextValid,
    /// Fully validated, including signatures. Connected at least once.
    ScriptsValid,
}

/// One block in the index tree.
#[derive(Debug, Clone)]
pub struct BlockIndexEntry {
    pub hash: Hash256,
    pub header: BlockHeader,
    pub height: u64,
    /// Total work from genesis through this block.
    pub chain_work: u128,
    /// Arrival order; lower wins fork-choice ties.
    pub sequence: u64,
    pub status: BlockStatus,
    /// Terminally invalid, directly or through an ancestor.
    pub failed: bool,
    /// Hash of the ancestor at [`skip_height`] of this entry's height, for
    /// logarithmic ancestor walks. None only on genesis.
    pub skip: Option<Hash256>,
}

fn invert_lowest_one(n: u64) -> u64 {
    n & n.wrapping_sub(1)
}

/// Height the skip pointer of an entry at `height` targets.
fn skip_height(height: u64) -> u64 {
    if height < 2 {
        return 0;
    }
    // Determined purely by the lowest bits, so the pointers of different
    // entries exponentially rarely coincide.
    if height & 1 == 1 {
        invert_lowest_one(invert_lowest_one(height - 1)) + 1
    } else {
        invert_lowest_one(height)
    }
}

impl BlockIndexEntry {
    /// Whether validation has reached at least `status` and not failed.
    pub fn is_valid_at_least(&self, status: BlockStatus) -> bool {
        !self.failed && self.status >= status
    }
}

/// The block tree: every known header, keyed by hash.
pub struct BlockIndex {
    entries: HashMap<Hash256, BlockIndexEntry>,
    children: HashMap<Hash256, Vec<Hash256>>,
    next_sequence: u64,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            children: HashMap::new(),
            next_sequence: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &BlockIndexEntry> {
        self.entries.values()
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash256) -> Option<&BlockIndexEntry> {
        self.entries.get(hash)
    }

    /// Insert the genesis header at height 0.
    pub fn insert_genesis(&mut self, header: BlockHeader) -> Hash256 {
        let hash = header.hash();
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.insert(
            hash,
            BlockIndexEntry {
                hash,
                chain_work: header.block_work(),
                header,
                height: 0,
                sequence,
                status: BlockStatus::ScriptsValid,
                failed: false,
                skip: None,
            },
        );
        hash
    }

    /// Insert a header whose parent is already indexed.
    ///
    /// Height and cumulative work derive from the parent. Children of failed
    /// ancestors are marked failed on arrival. Re-inserting a known hash is
    /// rejected.
    pub fn insert(&mut self, header: BlockHeader) -> Result<&BlockIndexEntry, ChainError> {
        let hash = header.hash();
        if self.entries.contains_key(&hash) {
            return Err(ChainError::DuplicateBlock(hash.to_string()));
        }

        let parent = self
            .entries
            .get(&header.prev_hash)
            .ok_or_else(|| ChainError::BlockNotFound(header.prev_hash.to_string()))?;
        let height = parent.height + 1;
        let chain_work = parent.chain_work + header.block_work();
        let inherits_failure = parent.failed;
        let prev_hash = header.prev_hash;
        let skip = self.ancestor(&prev_hash, skip_height(height)).map(|e| e.hash);

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.children.entry(prev_hash).or_default().push(hash);
        self.entries.insert(
            hash,
            BlockIndexEntry {
                hash,
                header,
                height,
                chain_work,
                sequence,
                status: BlockStatus::HeaderOnly,
                failed: inherits_failure,
                skip,
            },
        );
        Ok(&self.entries[&hash])
    }

    /// Raise a block's status. Lowering is ignored; status only climbs.
    pub fn advance_status(&mut self, hash: &Hash256, status: BlockStatus) {
        if let Some(entry) = self.entries.get_mut(hash) {
            if status > entry.status {
                entry.status = status;
            }
        }
    }

    /// Mark a block terminally invalid and propagate to all descendants.
    pub fn mark_failed(&mut self, hash: &Hash256) {
        let mut queue = vec![*hash];
        while let Some(current) = queue.pop() {
            if let Some(entry) = self.entries.get_mut(&current) {
                entry.failed = true;
            }
            if let Some(kids) = self.children.get(&current) {
                queue.extend(kids.iter().copied());
            }
        }
    }

    /// Ancestor of `hash` at `height`, following skip pointers where they
    /// land at or above the target.
    pub fn ancestor(&self, hash: &Hash256, height: u64) -> Option<&BlockIndexEntry> {
        let mut current = self.entries.get(hash)?;
        if height > current.height {
            return None;
        }
        while current.height > height {
            match current.skip {
                Some(skip) if skip_height(current.height) >= height => {
                    current = self.entries.get(&skip)?;
                }
                _ => current = self.entries.get(&current.header.prev_hash)?,
            }
        }
        Some(current)
    }

    /// Lowest common ancestor of two indexed blocks.
    pub fn last_common_ancestor(&self, a: &Hash256, b: &Hash256) -> Option<&BlockIndexEntry> {
        let entry_a = self.entries.get(a)?;
        let entry_b = self.entries.get(b)?;

        let height = entry_a.height.min(entry_b.height);
        let mut walk_a = self.ancestor(a, height)?;
        let mut walk_b = self.ancestor(b, height)?;

        while walk_a.hash != walk_b.hash {
            walk_a = self.entries.get(&walk_a.header.prev_hash)?;
            walk_b = self.entries.get(&walk_b.header.prev_hash)?;
        }
        Some(walk_a)
    }

    /// The hashes of every block building directly on `hash`.
    pub fn children_of(&self, hash: &Hash256) -> &[Hash256] {
        self.children.get(hash).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Default for BlockIndex {
    fn default() -> Self {
        Self::new()
    }
}
