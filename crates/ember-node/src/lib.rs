//! # ember-node — Full node composition and persistence.
//!
//! Composes the Ember engine into a running full node:
//! - [`storage::RocksStore`] — coins in RocksDB, block bodies in flat files
//! - [`node::Node`] — the submission and query surface
//! - [`config::NodeConfig`] — node configuration

pub mod block_files;
pub mod config;
pub mod node;
pub mod storage;

pub use config::NodeConfig;
pub use node::Node;
pub use storage::RocksStore;
