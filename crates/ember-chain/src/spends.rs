//! Recent spend tracking.
//!
//! [`SpentIndex`] remembers which block height consumed each outpoint,
//! back through the reorganization window. Wallets and collateral checks
//! ask it where a coin went after [`get_coin`] starts answering `None`.
//! Entries outside the window are pruned as the chain advances, and a
//! disconnection takes its block's records with it.
//!
//! [`get_coin`]: crate::chainstate::ChainManager::get_coin

use std::collections::{HashMap, VecDeque};

use ember_core::types::OutPoint;

/// Outpoint-to-spend-height map bounded to a trailing height window.
pub struct SpentIndex {
    by_outpoint: HashMap<OutPoint, u64>,
    /// Per-height buckets in connection order; the back is the tip.
    by_height: VecDeque<(u64, Vec<OutPoint>)>,
    /// Heights retained behind the tip.
    window: u64,
}

impl SpentIndex {
    pub fn new(window: u64) -> Self {
        Self {
            by_outpoint: HashMap::new(),
            by_height: VecDeque::new(),
            window,
        }
    }

    /// Record the outpoints a connected block at `height` consumed, then
    /// prune records that fell out of the window.
    pub fn record_connect(&mut self, height: u64, outpoints: Vec<OutPoint>) {
        for outpoint in &outpoints {
            self.by_outpoint.insert(*outpoint, height);
        }
        self.by_height.push_back((height, outpoints));

        let floor = height.saturating_sub(self.window);
        while self.by_height.front().is_some_and(|(h, _)| *h < floor) {
            if let Some((h, bucket)) = self.by_height.pop_front() {
                for outpoint in bucket {
                    // A reorg may have re-spent the outpoint higher up.
                    if self.by_outpoint.get(&outpoint) == Some(&h) {
                        self.by_outpoint.remove(&outpoint);
                    }
                }
            }
        }
    }

    /// Forget the spends of the block at `height` being disconnected.
    /// Disconnections run tip first, so the records sit at the back.
    pub fn record_disconnect(&mut self, height: u64) {
        while self.by_height.back().is_some_and(|(h, _)| *h == height) {
            if let Some((_, bucket)) = self.by_height.pop_back() {
                for outpoint in bucket {
                    self.by_outpoint.remove(&outpoint);
                }
            }
        }
    }

    /// Height whose block spent `outpoint`, if the spend is in the window.
    pub fn spend_height(&self, outpoint: &OutPoint) -> Option<u64> {
        self.by_outpoint.get(outpoint).copied()
    }

    pub fn len(&self) -> usize {
        self.by_outpoint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_outpoint.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::types::Hash256;

    fn outpoint(byte: u8, index: u64) -> OutPoint {
        OutPoint { txid: Hash256([byte; 32]), index }
    }

    #[test]
    fn records_and_answers_spend_heights() {
        let mut index = SpentIndex::new(100);
        index.record_connect(5, vec![outpoint(1, 0), outpoint(2, 3)]);
        index.record_connect(6, vec![outpoint(3, 0)]);

        assert_eq!(index.spend_height(&outpoint(1, 0)), Some(5));
        assert_eq!(index.spend_height(&outpoint(2, 3)), Some(5));
        assert_eq!(index.spend_height(&outpoint(3, 0)), Some(6));
        assert_eq!(index.spend_height(&outpoint(9, 0)), None);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn disconnect_forgets_the_block() {
        let mut index = SpentIndex::new(100);
        index.record_connect(5, vec![outpoint(1, 0)]);
        index.record_connect(6, vec![outpoint(2, 0)]);

        index.record_disconnect(6);
        assert_eq!(index.spend_height(&outpoint(2, 0)), None);
        assert_eq!(index.spend_height(&outpoint(1, 0)), Some(5));
    }

    #[test]
    fn entries_age_out_of_the_window() {
        let mut index = SpentIndex::new(2);
        index.record_connect(1, vec![outpoint(1, 0)]);
        index.record_connect(2, vec![outpoint(2, 0)]);
        index.record_connect(3, vec![outpoint(3, 0)]);
        assert_eq!(index.spend_height(&outpoint(1, 0)), Some(1));

        // Height 4 pushes height 1 below the floor.
        index.record_connect(4, vec![outpoint(4, 0)]);
        assert_eq!(index.spend_height(&outpoint(1, 0)), None);
        assert_eq!(index.spend_height(&outpoint(2, 0)), Some(2));
    }

    #[test]
    fn reorg_respend_survives_pruning_of_the_old_record() {
        let mut index = SpentIndex::new(2);
        index.record_connect(1, vec![outpoint(1, 0)]);
        index.record_disconnect(1);
        // The same outpoint is spent again by the replacement branch.
        index.record_connect(1, vec![outpoint(9, 9)]);
        index.record_connect(2, vec![outpoint(1, 0)]);

        index.record_connect(3, vec![]);
        index.record_connect(4, vec![]);
        // Height-1 buckets are pruned; the height-2 respend remains.
        assert_eq!(index.spend_height(&outpoint(1, 0)), Some(2));
        assert_eq!(index.spend_height(&outpoint(9, 9)), None);
    }
}
