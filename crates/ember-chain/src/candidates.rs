//! Fork-choice candidate set.
//!
//! Holds every block that could become the tip: valid enough to attempt a
//! connection and carrying at least as much work as the current tip. The
//! ordering is a total order — cumulative work first, then arrival sequence
//! (earlier wins), then hash as a final disambiguator — so chain selection is
//! deterministic for any set of received blocks.

use std::collections::BTreeSet;

use ember_core::types::Hash256;

/// Sort key for a candidate block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateKey {
    pub chain_work: u128,
    pub sequence: u64,
    pub hash: Hash256,
}

impl Ord for CandidateKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Greater = better. More work wins; on equal work the block that
        // arrived first (lower sequence) wins.
        self.chain_work
            .cmp(&other.chain_work)
            .then_with(|| other.sequence.cmp(&self.sequence))
            .then_with(|| self.hash.cmp(&other.hash))
    }
}

impl PartialOrd for CandidateKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// The set of potential tips, ordered by [`CandidateKey`].
#[derive(Debug, Default)]
pub struct CandidateSet {
    set: BTreeSet<CandidateKey>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self { set: BTreeSet::new() }
    }

    pub fn add(&mut self, key: CandidateKey) {
        self.set.insert(key);
    }

    pub fn remove(&mut self, key: &CandidateKey) -> bool {
        self.set.remove(key)
    }

    /// The best candidate under the fork-choice order.
    pub fn best(&self) -> Option<&CandidateKey> {
        self.set.last()
    }

    /// Drop every candidate with strictly less work than `work`.
    ///
    /// Called after a tip update: outworked candidates can never win and
    /// holding them only grows the set. Equal-work siblings stay, since a
    /// later failure of the tip would make one of them the best chain.
    pub fn prune_below(&mut self, work: u128) {
        self.set.retain(|key| key.chain_work >= work);
    }

    /// Remove every candidate matching a predicate on its hash.
    pub fn remove_matching<F: Fn(&Hash256) -> bool>(&mut self, pred: F) {
        self.set.retain(|key| !pred(&key.hash));
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}
