//! Listener interface for chain events.
//!
//! Wallets, relays, and indexers subscribe by implementing
//! [`ChainNotifications`]. The chain manager dispatches every callback
//! after its state lock is released, so implementations may call back into
//! the manager without deadlocking. Callbacks default to no-ops; a listener
//! implements only what it cares about.

use std::sync::Arc;

use ember_core::types::{Block, Hash256};

use crate::mempool::RemovalReason;

/// Chain events a collaborator can observe.
pub trait ChainNotifications: Send + Sync {
    /// A block joined the active chain at `height`.
    fn block_connected(&self, block: &Block, height: u64) {
        let _ = (block, height);
    }

    /// A block left the active chain during a reorganization.
    fn block_disconnected(&self, block: &Block, height: u64) {
        let _ = (block, height);
    }

    /// The active tip moved. `fork_point` is the last block shared with the
    /// previous tip when a reorganization happened, `None` on a plain
    /// extension. `initial_sync` is true while the tip is still far behind
    /// wall-clock time.
    fn tip_updated(
        &self,
        hash: &Hash256,
        height: u64,
        fork_point: Option<Hash256>,
        initial_sync: bool,
    ) {
        let _ = (hash, height, fork_point, initial_sync);
    }

    /// A transaction left the mempool for the given reason. Mined
    /// transactions are also covered by `block_connected`.
    fn transaction_removed(&self, txid: &Hash256, reason: RemovalReason) {
        let _ = (txid, reason);
    }
}

/// Listener that ignores everything.
pub struct NullNotifier;

impl ChainNotifications for NullNotifier {}

/// A fanout over registered listeners, dispatched in registration order.
#[derive(Default, Clone)]
pub struct NotificationSink {
    listeners: Vec<Arc<dyn ChainNotifications>>,
}

impl NotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Arc<dyn ChainNotifications>) {
        self.listeners.push(listener);
    }

    pub fn block_connected(&self, block: &Block, height: u64) {
        for l in &self.listeners {
            l.block_connected(block, height);
        }
    }

    pub fn block_disconnected(&self, block: &Block, height: u64) {
        for l in &self.listeners {
            l.block_disconnected(block, height);
        }
    }

    pub fn tip_updated(
        &self,
        hash: &Hash256,
        height: u64,
        fork_point: Option<Hash256>,
        initial_sync: bool,
    ) {
        for l in &self.listeners {
            l.tip_updated(hash, height, fork_point, initial_sync);
        }
    }

    pub fn transaction_removed(&self, txid: &Hash256, reason: RemovalReason) {
        for l in &self.listeners {
            l.transaction_removed(txid, reason);
        }
    }
}
