//! The active chain: an ordered view of the block index from genesis to tip.

use ember_core::types::Hash256;

/// Hashes of the active chain, indexed by height.
///
/// The chain state mutates this one block at a time as blocks connect and
/// disconnect; it never jumps.
#[derive(Debug, Clone, Default)]
pub struct ActiveChain {
    hashes: Vec<Hash256>,
}

impl ActiveChain {
    pub fn new() -> Self {
        Self { hashes: Vec::new() }
    }

    /// Height of the tip, `None` when even genesis is absent.
    pub fn height(&self) -> Option<u64> {
        self.hashes.len().checked_sub(1).map(|h| h as u64)
    }

    pub fn tip(&self) -> Option<Hash256> {
        self.hashes.last().copied()
    }

    pub fn hash_at(&self, height: u64) -> Option<Hash256> {
        self.hashes.get(height as usize).copied()
    }

    /// Whether `hash` is the active block at `height`.
    pub fn contains_at(&self, height: u64, hash: &Hash256) -> bool {
        self.hash_at(height) == Some(*hash)
    }

    /// Extend the chain by one block.
    pub fn push(&mut self, hash: Hash256) {
        self.hashes.push(hash);
    }

    /// Remove and return the tip.
    pub fn pop(&mut self) -> Option<Hash256> {
        self.hashes.pop()
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(n: u8) -> Hash256 {
        Hash256([n; 32])
    }

    #[test]
    fn empty_chain_has_no_tip() {
        let chain = ActiveChain::new();
        assert_eq!(chain.tip(), None);
        assert_eq!(chain.height(), None);
    }

    #[test]
    fn push_and_pop_track_tip() {
        let mut chain = ActiveChain::new();
        chain.push(h(0));
        chain.push(h(1));
        assert_eq!(chain.height(), Some(1));
        assert_eq!(chain.tip(), Some(h(1)));
        assert_eq!(chain.hash_at(0), Some(h(0)));

        assert_eq!(chain.pop(), Some(h(1)));
        assert_eq!(chain.tip(), Some(h(0)));
    }

    #[test]
    fn contains_at_checks_height_and_hash() {
        let mut chain = ActiveChain::new();
        chain.push(h(0));
        chain.push(h(1));
        assert!(chain.contains_at(1, &h(1)));
        assert!(!chain.contains_at(0, &h(1)));
        assert!(!chain.contains_at(5, &h(1)));
    }
}
