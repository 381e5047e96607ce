//! RocksDB-backed persistence for the chain.
//!
//! [`RocksStore`] implements both storage seams of the engine:
//! [`CoinsBackend`] over the `coins` column family, and [`BlockStore`] with
//! index entries in RocksDB and block/undo bodies in flat files (see
//! [`block_files`](crate::block_files)). Coin flushes land as one atomic
//! [`WriteBatch`] that carries the best-block marker, so after a crash the
//! marker always describes exactly the coin set on disk.

use std::path::Path;

use parking_lot::Mutex;
use rocksdb::{ColumnFamilyDescriptor, Options, WriteBatch, DB};

use ember_chain::coins::{CoinsBackend, CoinsChangeSet};
use ember_chain::store::{BlockStore, StoredIndexEntry};
use ember_chain::undo::BlockUndo;
use ember_core::error::ChainError;
use ember_core::types::{Block, Coin, Hash256, OutPoint};

use crate::block_files::{BlockFiles, DiskPos, FileKind};

// --- Column family names ---

const CF_COINS: &str = "coins";
const CF_BLOCK_INDEX: &str = "block_index";
const CF_METADATA: &str = "metadata";

const ALL_CFS: &[&str] = &[CF_COINS, CF_BLOCK_INDEX, CF_METADATA];

// --- Metadata keys ---

const META_BEST_BLOCK: &[u8] = b"best_block";
const BLOCK_POS_PREFIX: &[u8] = b"blk:";
const UNDO_POS_PREFIX: &[u8] = b"rev:";

fn storage_err(e: rocksdb::Error) -> ChainError {
    ChainError::Storage(e.to_string())
}

fn encode_err(e: bincode::error::EncodeError) -> ChainError {
    ChainError::Storage(e.to_string())
}

fn decode_err(e: bincode::error::DecodeError) -> ChainError {
    ChainError::Storage(e.to_string())
}

fn pos_key(prefix: &[u8], hash: &Hash256) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 32);
    key.extend_from_slice(prefix);
    key.extend_from_slice(hash.as_bytes());
    key
}

/// RocksDB plus flat-file chain storage.
pub struct RocksStore {
    db: DB,
    files: Mutex<BlockFiles>,
}

impl RocksStore {
    /// Open or create the database and block files under `dir`.
    ///
    /// RocksDB lives in `dir/chaindata`, flat files in `dir/blocks`. The
    /// network `magic` frames every flat-file record, so opening a regtest
    /// directory as mainnet fails loudly instead of decoding garbage.
    pub fn open(dir: impl AsRef<Path>, magic: [u8; 4]) -> Result<Self, ChainError> {
        let dir = dir.as_ref();
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, dir.join("chaindata"), cf_descriptors)
            .map_err(storage_err)?;
        let files = BlockFiles::open(&dir.join("blocks"), magic)?;

        Ok(Self { db, files: Mutex::new(files) })
    }

    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, ChainError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| ChainError::Storage(format!("missing column family: {name}")))
    }

    fn coin_key(outpoint: &OutPoint) -> Result<Vec<u8>, ChainError> {
        bincode::encode_to_vec(outpoint, bincode::config::standard()).map_err(encode_err)
    }

    fn get_pos(&self, prefix: &[u8], hash: &Hash256) -> Result<Option<DiskPos>, ChainError> {
        let cf = self.cf_handle(CF_METADATA)?;
        let bytes = match self.db.get_cf(&cf, pos_key(prefix, hash)).map_err(storage_err)? {
            Some(b) => b,
            None => return Ok(None),
        };
        let (pos, _) =
            bincode::decode_from_slice(&bytes, bincode::config::standard()).map_err(decode_err)?;
        Ok(Some(pos))
    }

    fn put_pos(&self, prefix: &[u8], hash: &Hash256, pos: DiskPos) -> Result<(), ChainError> {
        let cf = self.cf_handle(CF_METADATA)?;
        let bytes = bincode::encode_to_vec(pos, bincode::config::standard()).map_err(encode_err)?;
        self.db.put_cf(&cf, pos_key(prefix, hash), bytes).map_err(storage_err)
    }
}

impl CoinsBackend for RocksStore {
    fn get_coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, ChainError> {
        let cf = self.cf_handle(CF_COINS)?;
        let bytes = match self.db.get_cf(&cf, Self::coin_key(outpoint)?).map_err(storage_err)? {
            Some(b) => b,
            None => return Ok(None),
        };
        let (coin, _) =
            bincode::decode_from_slice(&bytes, bincode::config::standard()).map_err(decode_err)?;
        Ok(Some(coin))
    }

    fn best_block(&self) -> Result<Option<Hash256>, ChainError> {
        let cf = self.cf_handle(CF_METADATA)?;
        match self.db.get_cf(&cf, META_BEST_BLOCK).map_err(storage_err)? {
            Some(bytes) => {
                let raw: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                    ChainError::Storage("best-block marker has wrong length".into())
                })?;
                Ok(Some(Hash256(raw)))
            }
            None => Ok(None),
        }
    }

    fn write(&self, changes: CoinsChangeSet, best_block: Hash256) -> Result<(), ChainError> {
        let cf_coins = self.cf_handle(CF_COINS)?;
        let cf_meta = self.cf_handle(CF_METADATA)?;

        let mut batch = WriteBatch::default();
        for (outpoint, coin) in &changes.added {
            let bytes =
                bincode::encode_to_vec(coin, bincode::config::standard()).map_err(encode_err)?;
            batch.put_cf(cf_coins, Self::coin_key(outpoint)?, bytes);
        }
        for outpoint in &changes.removed {
            batch.delete_cf(cf_coins, Self::coin_key(outpoint)?);
        }
        batch.put_cf(cf_meta, META_BEST_BLOCK, best_block.as_bytes());
        self.db.write(batch).map_err(storage_err)
    }
}

impl BlockStore for RocksStore {
    fn put_block(&self, hash: &Hash256, block: &Block) -> Result<(), ChainError> {
        let payload =
            bincode::encode_to_vec(block, bincode::config::standard()).map_err(encode_err)?;
        let pos = self.files.lock().append(FileKind::Block, &payload)?;
        self.put_pos(BLOCK_POS_PREFIX, hash, pos)
    }

    fn block(&self, hash: &Hash256) -> Result<Option<Block>, ChainError> {
        let pos = match self.get_pos(BLOCK_POS_PREFIX, hash)? {
            Some(p) => p,
            None => return Ok(None),
        };
        let payload = self.files.lock().read(FileKind::Block, pos)?;
        let (block, _) = bincode::decode_from_slice(&payload, bincode::config::standard())
            .map_err(decode_err)?;
        Ok(Some(block))
    }

    fn put_undo(&self, hash: &Hash256, undo: &BlockUndo) -> Result<(), ChainError> {
        let payload =
            bincode::encode_to_vec(undo, bincode::config::standard()).map_err(encode_err)?;
        let pos = self.files.lock().append(FileKind::Undo, &payload)?;
        self.put_pos(UNDO_POS_PREFIX, hash, pos)
    }

    fn undo(&self, hash: &Hash256) -> Result<Option<BlockUndo>, ChainError> {
        let pos = match self.get_pos(UNDO_POS_PREFIX, hash)? {
            Some(p) => p,
            None => return Ok(None),
        };
        let payload = self.files.lock().read(FileKind::Undo, pos)?;
        let (undo, _) = bincode::decode_from_slice(&payload, bincode::config::standard())
            .map_err(decode_err)?;
        Ok(Some(undo))
    }

    fn put_index_entry(&self, entry: &StoredIndexEntry) -> Result<(), ChainError> {
        let cf = self.cf_handle(CF_BLOCK_INDEX)?;
        let bytes =
            bincode::encode_to_vec(entry, bincode::config::standard()).map_err(encode_err)?;
        self.db.put_cf(&cf, entry.header.hash().as_bytes(), bytes).map_err(storage_err)
    }

    fn index_entries(&self) -> Result<Vec<StoredIndexEntry>, ChainError> {
        let cf = self.cf_handle(CF_BLOCK_INDEX)?;
        let mut entries = Vec::new();
        for item in self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (_, value) = item.map_err(storage_err)?;
            let (entry, _) = bincode::decode_from_slice(&value, bincode::config::standard())
                .map_err(decode_err)?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use ember_chain::block_index::BlockStatus;
    use ember_core::params::Network;
    use ember_core::types::{BlockHeader, CoinOrigin, TxOutput};

    fn open_store(dir: &TempDir) -> RocksStore {
        RocksStore::open(dir.path(), Network::Regtest.magic_bytes()).unwrap()
    }

    fn coin(value: u64) -> Coin {
        Coin {
            output: TxOutput { value, pubkey_hash: Hash256([0xAB; 32]) },
            height: 7,
            origin: CoinOrigin::Transfer,
        }
    }

    fn header(nonce: u64) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_hash: Hash256::ZERO,
            merkle_root: Hash256::ZERO,
            timestamp: 1,
            target: u64::MAX,
            nonce,
        }
    }

    #[test]
    fn coin_write_is_atomic_with_marker() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let outpoint = OutPoint { txid: Hash256([1; 32]), index: 0 };
        let marker = Hash256([9; 32]);

        assert!(store.best_block().unwrap().is_none());
        store
            .write(
                CoinsChangeSet { added: vec![(outpoint, coin(50))], removed: vec![] },
                marker,
            )
            .unwrap();

        assert_eq!(store.get_coin(&outpoint).unwrap().unwrap().output.value, 50);
        assert_eq!(store.best_block().unwrap(), Some(marker));

        store
            .write(
                CoinsChangeSet { added: vec![], removed: vec![outpoint] },
                Hash256([10; 32]),
            )
            .unwrap();
        assert!(store.get_coin(&outpoint).unwrap().is_none());
        assert_eq!(store.best_block().unwrap(), Some(Hash256([10; 32])));
    }

    #[test]
    fn blocks_and_undo_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let block = Block { header: header(3), transactions: vec![] };
        let hash = block.header.hash();
        let undo = BlockUndo::default();

        {
            let store = open_store(&dir);
            store.put_block(&hash, &block).unwrap();
            store.put_undo(&hash, &undo).unwrap();
            store
                .put_index_entry(&StoredIndexEntry {
                    header: block.header,
                    status: BlockStatus::ScriptsValid,
                    failed: false,
                })
                .unwrap();
        }

        let store = open_store(&dir);
        assert_eq!(store.block(&hash).unwrap(), Some(block));
        assert_eq!(store.undo(&hash).unwrap(), Some(undo));
        let entries = store.index_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, BlockStatus::ScriptsValid);
    }

    #[test]
    fn unknown_block_is_none() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(store.block(&Hash256([5; 32])).unwrap().is_none());
        assert!(store.undo(&Hash256([5; 32])).unwrap().is_none());
    }
}
