//! Block and undo storage interface.
//!
//! The chain manager reads and writes block bodies, undo logs, and index
//! entries through [`BlockStore`]; the production node backs it with flat
//! files and RocksDB, tests use [`MemoryBlockStore`].

use std::collections::HashMap;

use parking_lot::RwLock;

use ember_core::error::ChainError;
use ember_core::types::{Block, BlockHeader, Hash256};

use crate::block_index::BlockStatus;
use crate::undo::BlockUndo;

/// A block index entry as persisted.
///
/// Height, chain work, and arrival sequence are rebuilt from the header tree
/// on load, so only the header and validation outcome are stored.
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct StoredIndexEntry {
    pub header: BlockHeader,
    pub status: BlockStatus,
    pub failed: bool,
}

/// Durable storage for block bodies, undo logs, and index entries.
///
/// Writes must be visible to subsequent reads through the same store.
/// Callers serialize access; implementations only need interior mutability.
pub trait BlockStore: Send + Sync {
    fn put_block(&self, hash: &Hash256, block: &Block) -> Result<(), ChainError>;
    fn block(&self, hash: &Hash256) -> Result<Option<Block>, ChainError>;
    fn put_undo(&self, hash: &Hash256, undo: &BlockUndo) -> Result<(), ChainError>;
    fn undo(&self, hash: &Hash256) -> Result<Option<BlockUndo>, ChainError>;
    /// Insert or overwrite the entry for the header's hash.
    fn put_index_entry(&self, entry: &StoredIndexEntry) -> Result<(), ChainError>;
    /// All stored index entries, in no particular order.
    fn index_entries(&self) -> Result<Vec<StoredIndexEntry>, ChainError>;
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: RwLock<HashMap<Hash256, Block>>,
    undos: RwLock<HashMap<Hash256, BlockUndo>>,
    index: RwLock<HashMap<Hash256, StoredIndexEntry>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn undo_count(&self) -> usize {
        self.undos.read().len()
    }
}

impl BlockStore for MemoryBlockStore {
    fn put_block(&self, hash: &Hash256, block: &Block) -> Result<(), ChainError> {
        self.blocks.write().insert(*hash, block.clone());
        Ok(())
    }

    fn block(&self, hash: &Hash256) -> Result<Option<Block>, ChainError> {
        Ok(self.blocks.read().get(hash).cloned())
    }

    fn put_undo(&self, hash: &Hash256, undo: &BlockUndo) -> Result<(), ChainError> {
        self.undos.write().insert(*hash, undo.clone());
        Ok(())
    }

    fn undo(&self, hash: &Hash256) -> Result<Option<BlockUndo>, ChainError> {
        Ok(self.undos.read().get(hash).cloned())
    }

    fn put_index_entry(&self, entry: &StoredIndexEntry) -> Result<(), ChainError> {
        self.index.write().insert(entry.header.hash(), entry.clone());
        Ok(())
    }

    fn index_entries(&self) -> Result<Vec<StoredIndexEntry>, ChainError> {
        Ok(self.index.read().values().cloned().collect())
    }
}
