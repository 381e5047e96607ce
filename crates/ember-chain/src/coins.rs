//! Layered unspent-coin store.
//!
//! [`CoinsBackend`] is the persistence seam: the node implements it over
//! RocksDB, tests use [`MemoryCoins`]. [`CoinsCache`] sits on top and absorbs
//! block connection and disconnection, flushing batched changes downward
//! together with the best-block marker so the backend can commit both
//! atomically.
//!
//! Cache entries track two flags:
//! - **dirty**: the entry differs from the backend and must be written out.
//! - **fresh**: the backend has never seen this coin. Spending a fresh coin
//!   erases the entry entirely, so short-lived coins never touch disk.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use ember_core::error::ChainError;
use ember_core::types::{Coin, Hash256, OutPoint};

/// Changes accumulated in a [`CoinsCache`], handed to the backend on flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoinsChangeSet {
    /// Coins to insert or overwrite.
    pub added: Vec<(OutPoint, Coin)>,
    /// Coins to delete.
    pub removed: Vec<OutPoint>,
}

impl CoinsChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Persistent coin storage beneath the cache.
///
/// `write` must apply the change set and the best-block marker atomically:
/// after a crash, the marker always describes exactly the coin set on disk.
pub trait CoinsBackend: Send + Sync {
    /// Look up a coin by outpoint.
    fn get_coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, ChainError>;

    /// Hash of the block whose connection produced the stored coin set.
    /// `None` for a virgin store.
    fn best_block(&self) -> Result<Option<Hash256>, ChainError>;

    /// Atomically apply `changes` and advance the best-block marker.
    fn write(&self, changes: CoinsChangeSet, best_block: Hash256) -> Result<(), ChainError>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    /// `None` marks a spent coin awaiting deletion downstream.
    coin: Option<Coin>,
    fresh: bool,
}

/// Write-back cache over a [`CoinsBackend`].
///
/// Holds only modified entries; reads fall through to the backend. The best
/// block tracked here runs ahead of the backend's marker until [`flush`]
/// pushes the accumulated changes down.
///
/// [`flush`]: CoinsCache::flush
pub struct CoinsCache {
    base: Arc<dyn CoinsBackend>,
    entries: HashMap<OutPoint, CacheEntry>,
    best_block: Option<Hash256>,
}

impl CoinsCache {
    pub fn new(base: Arc<dyn CoinsBackend>) -> Result<Self, ChainError> {
        let best_block = base.best_block()?;
        Ok(Self {
            base,
            entries: HashMap::new(),
            best_block,
        })
    }

    /// Look up an unspent coin. Sees cached modifications first.
    pub fn get_coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, ChainError> {
        if let Some(entry) = self.entries.get(outpoint) {
            return Ok(entry.coin.clone());
        }
        self.base.get_coin(outpoint)
    }

    /// Whether an unspent coin exists at `outpoint`.
    pub fn have_coin(&self, outpoint: &OutPoint) -> Result<bool, ChainError> {
        Ok(self.get_coin(outpoint)?.is_some())
    }

    /// Hash of the block this view represents the state after.
    pub fn best_block(&self) -> Option<Hash256> {
        self.best_block
    }

    /// Advance the view to represent the state after `hash`.
    pub fn set_best_block(&mut self, hash: Hash256) {
        self.best_block = Some(hash);
    }

    /// Add a newly created coin.
    ///
    /// The entry is fresh when the backend has no live coin at the outpoint,
    /// which is the common case; a block re-creating an outpoint the backend
    /// still holds (only possible across a reorg that rewinds past the
    /// original creation) produces a plain dirty entry.
    pub fn add_coin(&mut self, outpoint: OutPoint, coin: Coin) -> Result<(), ChainError> {
        let fresh = match self.entries.get(&outpoint) {
            // A cached spend (coin: None) proves the backend still holds the
            // coin, so the re-created entry is not fresh. Fresh spends never
            // linger as entries.
            Some(entry) => entry.fresh,
            None => self.base.get_coin(&outpoint)?.is_none(),
        };
        self.entries.insert(outpoint, CacheEntry { coin: Some(coin), fresh });
        Ok(())
    }

    /// Spend the coin at `outpoint`, returning it for undo recording.
    ///
    /// Spending a fresh coin drops the entry entirely; the backend never
    /// learns the coin existed.
    pub fn spend_coin(&mut self, outpoint: &OutPoint) -> Result<Coin, ChainError> {
        if let Some(entry) = self.entries.get_mut(outpoint) {
            let Some(coin) = entry.coin.take() else {
                return Err(ChainError::CoinNotFound(outpoint.to_string()));
            };
            if entry.fresh {
                self.entries.remove(outpoint);
            }
            return Ok(coin);
        }

        let coin = self
            .base
            .get_coin(outpoint)?
            .ok_or_else(|| ChainError::CoinNotFound(outpoint.to_string()))?;
        self.entries.insert(outpoint.clone(), CacheEntry { coin: None, fresh: false });
        Ok(coin)
    }

    /// Restore a previously spent coin during block disconnection.
    pub fn restore_coin(&mut self, outpoint: OutPoint, coin: Coin) {
        // The backend may or may not still hold the coin; treating the entry
        // as non-fresh makes the flush write it unconditionally, which is
        // correct either way.
        self.entries.insert(outpoint, CacheEntry { coin: Some(coin), fresh: false });
    }

    /// Remove a coin created by a block being disconnected.
    pub fn evict_coin(&mut self, outpoint: &OutPoint) {
        match self.entries.get(outpoint) {
            Some(entry) if entry.fresh => {
                self.entries.remove(outpoint);
            }
            _ => {
                self.entries
                    .insert(outpoint.clone(), CacheEntry { coin: None, fresh: false });
            }
        }
    }

    /// Number of modified entries held in memory.
    pub fn dirty_count(&self) -> usize {
        self.entries.len()
    }

    /// Approximate memory footprint of the held entries in bytes.
    ///
    /// Coins carry no heap data, so the footprint is a per-entry constant
    /// times the entry count. The orchestrator compares this against its
    /// byte budget to decide when to flush early.
    pub fn memory_usage(&self) -> usize {
        self.entries.len() * (size_of::<OutPoint>() + size_of::<CacheEntry>())
    }

    /// Push all accumulated changes and the best-block marker to the backend.
    pub fn flush(&mut self) -> Result<(), ChainError> {
        let Some(best) = self.best_block else {
            // Nothing connected yet.
            return Ok(());
        };

        let mut changes = CoinsChangeSet::default();
        for (outpoint, entry) in self.entries.drain() {
            match entry.coin {
                Some(coin) => changes.added.push((outpoint, coin)),
                // Fresh spent entries were erased eagerly; every remaining
                // spend is known to the backend.
                None => changes.removed.push(outpoint),
            }
        }

        self.base.write(changes, best)
    }
}

/// In-memory [`CoinsBackend`] for tests.
pub struct MemoryCoins {
    inner: RwLock<MemoryCoinsInner>,
}

#[derive(Default)]
struct MemoryCoinsInner {
    coins: HashMap<OutPoint, Coin>,
    best_block: Option<Hash256>,
}

impl MemoryCoins {
    pub fn new() -> Self {
        Self { inner: RwLock::new(MemoryCoinsInner::default()) }
    }

    /// Number of coins held. Test observability.
    pub fn coin_count(&self) -> usize {
        self.inner.read().coins.len()
    }
}

impl Default for MemoryCoins {
    fn default() -> Self {
        Self::new()
    }
}

impl CoinsBackend for MemoryCoins {
    fn get_coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, ChainError> {
        Ok(self.inner.read().coins.get(outpoint).cloned())
    }

    fn best_block(&self) -> Result<Option<Hash256>, ChainError> {
        Ok(self.inner.read().best_block)
    }

    fn write(&self, changes: CoinsChangeSet, best_block: Hash256) -> Result<(), ChainError> {
        let mut inner = self.inner.write();
        for (outpoint, coin) in changes.added {
            inner.coins.insert(outpoint, coin);
        }
        for outpoint in changes.removed {
            inner.coins.remove(&outpoint);
        }
        inner.best_block = Some(best_block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::types::{CoinOrigin, TxOutput};

    fn outpoint(n: u8, index: u64) -> OutPoint {
        OutPoint { txid: Hash256([n; 32]), index }
    }

    fn coin(value: u64, height: u64) -> Coin {
        Coin {
            output: TxOutput { value, pubkey_hash: Hash256([0xAA; 32]) },
            height,
            origin: CoinOrigin::Transfer,
        }
    }

    fn cache_over(backend: Arc<MemoryCoins>) -> CoinsCache {
        CoinsCache::new(backend).unwrap()
    }

    #[test]
    fn reads_fall_through_to_backend() {
        let backend = Arc::new(MemoryCoins::new());
        backend
            .write(
                CoinsChangeSet { added: vec![(outpoint(1, 0), coin(100, 5))], removed: vec![] },
                Hash256([0x01; 32]),
            )
            .unwrap();

        let cache = cache_over(backend);
        assert_eq!(cache.get_coin(&outpoint(1, 0)).unwrap(), Some(coin(100, 5)));
        assert!(!cache.have_coin(&outpoint(2, 0)).unwrap());
        assert_eq!(cache.best_block(), Some(Hash256([0x01; 32])));
    }

    #[test]
    fn add_then_spend_fresh_coin_never_reaches_backend() {
        let backend = Arc::new(MemoryCoins::new());
        let mut cache = cache_over(backend.clone());

        cache.add_coin(outpoint(1, 0), coin(100, 1)).unwrap();
        let spent = cache.spend_coin(&outpoint(1, 0)).unwrap();
        assert_eq!(spent, coin(100, 1));
        assert_eq!(cache.dirty_count(), 0);

        cache.set_best_block(Hash256([0x02; 32]));
        cache.flush().unwrap();
        assert_eq!(backend.coin_count(), 0);
    }

    #[test]
    fn spending_backend_coin_records_deletion() {
        let backend = Arc::new(MemoryCoins::new());
        backend
            .write(
                CoinsChangeSet { added: vec![(outpoint(1, 0), coin(100, 5))], removed: vec![] },
                Hash256([0x01; 32]),
            )
            .unwrap();
        let mut cache = cache_over(backend.clone());

        cache.spend_coin(&outpoint(1, 0)).unwrap();
        assert_eq!(cache.get_coin(&outpoint(1, 0)).unwrap(), None);
        // The backend still holds it until flush.
        assert_eq!(backend.coin_count(), 1);

        cache.set_best_block(Hash256([0x02; 32]));
        cache.flush().unwrap();
        assert_eq!(backend.coin_count(), 0);
        assert_eq!(backend.best_block().unwrap(), Some(Hash256([0x02; 32])));
    }

    #[test]
    fn double_spend_in_cache_is_an_error() {
        let backend = Arc::new(MemoryCoins::new());
        backend
            .write(
                CoinsChangeSet { added: vec![(outpoint(1, 0), coin(100, 5))], removed: vec![] },
                Hash256([0x01; 32]),
            )
            .unwrap();
        let mut cache = cache_over(backend);

        cache.spend_coin(&outpoint(1, 0)).unwrap();
        assert!(matches!(
            cache.spend_coin(&outpoint(1, 0)),
            Err(ChainError::CoinNotFound(_))
        ));
    }

    #[test]
    fn spend_unknown_coin_is_an_error() {
        let backend = Arc::new(MemoryCoins::new());
        let mut cache = cache_over(backend);
        assert!(matches!(
            cache.spend_coin(&outpoint(9, 9)),
            Err(ChainError::CoinNotFound(_))
        ));
    }

    #[test]
    fn flush_persists_additions_and_marker() {
        let backend = Arc::new(MemoryCoins::new());
        let mut cache = cache_over(backend.clone());

        cache.add_coin(outpoint(1, 0), coin(100, 1)).unwrap();
        cache.add_coin(outpoint(1, 1), coin(250, 1)).unwrap();
        cache.set_best_block(Hash256([0x07; 32]));
        cache.flush().unwrap();

        assert_eq!(backend.coin_count(), 2);
        assert_eq!(backend.best_block().unwrap(), Some(Hash256([0x07; 32])));
        assert_eq!(cache.dirty_count(), 0);
        // The cache still answers through the backend.
        assert_eq!(cache.get_coin(&outpoint(1, 1)).unwrap(), Some(coin(250, 1)));
    }

    #[test]
    fn restore_and_evict_reverse_a_connection() {
        let backend = Arc::new(MemoryCoins::new());
        backend
            .write(
                CoinsChangeSet { added: vec![(outpoint(1, 0), coin(100, 5))], removed: vec![] },
                Hash256([0x01; 32]),
            )
            .unwrap();
        let mut cache = cache_over(backend.clone());

        // Connect: spend the backend coin, create a new one.
        let spent = cache.spend_coin(&outpoint(1, 0)).unwrap();
        cache.add_coin(outpoint(2, 0), coin(90, 6)).unwrap();
        cache.set_best_block(Hash256([0x02; 32]));

        // Disconnect: evict the created coin, restore the spent one.
        cache.evict_coin(&outpoint(2, 0));
        cache.restore_coin(outpoint(1, 0), spent);
        cache.set_best_block(Hash256([0x01; 32]));

        assert_eq!(cache.get_coin(&outpoint(1, 0)).unwrap(), Some(coin(100, 5)));
        assert_eq!(cache.get_coin(&outpoint(2, 0)).unwrap(), None);

        cache.flush().unwrap();
        assert_eq!(backend.coin_count(), 1);
        assert!(backend.get_coin(&outpoint(1, 0)).unwrap().is_some());
    }

    #[test]
    fn memory_usage_tracks_entries_and_empties_on_flush() {
        let backend = Arc::new(MemoryCoins::new());
        let mut cache = cache_over(backend);
        assert_eq!(cache.memory_usage(), 0);

        cache.add_coin(outpoint(1, 0), coin(100, 1)).unwrap();
        let one = cache.memory_usage();
        assert!(one > 0);
        cache.add_coin(outpoint(1, 1), coin(250, 1)).unwrap();
        assert_eq!(cache.memory_usage(), 2 * one);

        cache.set_best_block(Hash256([0x03; 32]));
        cache.flush().unwrap();
        assert_eq!(cache.memory_usage(), 0);
    }

    #[test]
    fn flush_on_virgin_store_is_a_no_op() {
        let backend = Arc::new(MemoryCoins::new());
        let mut cache = cache_over(backend.clone());
        cache.flush().unwrap();
        assert_eq!(backend.best_block().unwrap(), None);
    }
}
