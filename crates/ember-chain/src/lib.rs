//! # ember-chain
//! Block index, coin store, mempool, and chain selection for Ember.
//!
//! The entry point is [`chainstate::ChainManager`]; storage plugs in
//! through [`coins::CoinsBackend`] and [`store::BlockStore`].

pub mod apply;
pub mod block_index;
pub mod candidates;
pub mod chain;
pub mod chainstate;
pub mod coins;
pub mod mempool;
pub mod notify;
pub mod spends;
pub mod store;
pub mod undo;
