//! Integration test suite for the Ember chain-state engine.
//!
//! The tests in `tests/` drive the engine through its public surfaces: block
//! acceptance and reorganization, mempool admission, and the persistent node.
//! Property tests verify the invariants that must hold for arbitrary inputs.

pub mod helpers;
