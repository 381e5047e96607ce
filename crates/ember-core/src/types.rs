//! Core protocol types: transactions, blocks, and unspent coins.
//!
//! All monetary values are in sparks (1 EMBER = 10^8 sparks).
//! All numeric fields are u64 per protocol convention.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::TxError;

/// A 32-byte hash value.
///
/// Used for transaction IDs (BLAKE3), block header hashes (double SHA-256),
/// and merkle roots (BLAKE3).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes). Used for coinbase previous outpoints.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Reference to a specific output of a previous transaction.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub struct OutPoint {
    /// Transaction ID containing the referenced output.
    pub txid: Hash256,
    /// Index of the output within the transaction.
    pub index: u64,
}

impl OutPoint {
    /// The null outpoint, used for coinbase transaction inputs.
    pub fn null() -> Self {
        Self {
            txid: Hash256::ZERO,
            index: u64::MAX,
        }
    }

    /// Check if this is the null outpoint (coinbase marker).
    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.index == u64::MAX
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

/// A transaction input, spending a previous output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxInput {
    /// The outpoint being spent. Null outpoint for coinbase.
    pub previous_output: OutPoint,
    /// Ed25519 signature (64 bytes). Empty for coinbase inputs.
    pub signature: Vec<u8>,
    /// Ed25519 public key (32 bytes). Empty for coinbase inputs.
    pub public_key: Vec<u8>,
}

/// A transaction output, creating a new coin.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxOutput {
    /// Value in sparks (1 EMBER = 10^8 sparks).
    pub value: u64,
    /// BLAKE3 hash of the recipient's Ed25519 public key.
    pub pubkey_hash: Hash256,
}

/// Transaction kind marker.
///
/// `Stake` marks a coinstake: the transaction at index 1 of a proof-of-stake
/// block that consumes the staked coin and pays out the stake reward.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub enum TxKind {
    /// Ordinary value transfer.
    #[default]
    Transfer,
    /// Coinstake transaction of a proof-of-stake block.
    Stake,
}

/// A transaction transferring value between addresses.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    /// Protocol version.
    pub version: u64,
    /// Transfer or coinstake.
    pub kind: TxKind,
    /// Inputs consuming previous outputs.
    pub inputs: Vec<TxInput>,
    /// New outputs created by this transaction.
    pub outputs: Vec<TxOutput>,
    /// Block height or timestamp before which this tx is invalid.
    pub lock_time: u64,
}

/// `lock_time` values below this threshold are heights, above are unix timestamps.
pub const LOCKTIME_THRESHOLD: u64 = 500_000_000;

impl Transaction {
    /// Compute the transaction ID (BLAKE3 hash of the canonical encoding).
    ///
    /// Uses bincode with standard config for deterministic serialization.
    /// Returns an error if serialization fails.
    pub fn txid(&self) -> Result<Hash256, TxError> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| TxError::Serialization(e.to_string()))?;
        Ok(Hash256(blake3::hash(&encoded).into()))
    }

    /// Check if this is a coinbase transaction (single input with null outpoint).
    pub fn is_coinbase(&self) -> bool {
        self.kind == TxKind::Transfer
            && self.inputs.len() == 1
            && self.inputs[0].previous_output.is_null()
    }

    /// Check if this is a coinstake transaction.
    ///
    /// A coinstake spends at least one real outpoint and carries the `Stake`
    /// kind marker. It is only valid at index 1 of a proof-of-stake block.
    pub fn is_coinstake(&self) -> bool {
        self.kind == TxKind::Stake
            && !self.inputs.is_empty()
            && !self.inputs[0].previous_output.is_null()
    }

    /// Sum of all output values. Returns None on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }

    /// Check whether the transaction is final at the given height and time.
    ///
    /// A `lock_time` of zero is always final. Otherwise values below
    /// [`LOCKTIME_THRESHOLD`] are compared against the block height and values
    /// at or above it against the block timestamp.
    pub fn is_final(&self, height: u64, block_time: u64) -> bool {
        if self.lock_time == 0 {
            return true;
        }
        if self.lock_time < LOCKTIME_THRESHOLD {
            self.lock_time <= height
        } else {
            self.lock_time <= block_time
        }
    }
}

/// Block header committing to the parent chain and transaction set.
///
/// Hash is computed as double SHA-256 over a fixed byte layout.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockHeader {
    /// Protocol version.
    pub version: u64,
    /// Hash of the previous block header.
    pub prev_hash: Hash256,
    /// BLAKE3 merkle root of the block's transactions.
    pub merkle_root: Hash256,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Difficulty target: header hashes interpreted as little-endian u64
    /// prefixes must be at or below this value.
    pub target: u64,
    /// Proof-of-work nonce. Zero in proof-of-stake blocks.
    pub nonce: u64,
}

impl BlockHeader {
    /// Header size in bytes when serialized for hashing (4 u64 fields + 2 * 32-byte hashes).
    const HASH_SIZE: usize = 4 * 8 + 2 * 32;

    /// Compute the block header hash (double SHA-256).
    ///
    /// Uses an explicit fixed byte layout: version || prev_hash || merkle_root ||
    /// timestamp || target || nonce, all little-endian.
    pub fn hash(&self) -> Hash256 {
        let mut data = Vec::with_capacity(Self::HASH_SIZE);
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(self.prev_hash.as_bytes());
        data.extend_from_slice(self.merkle_root.as_bytes());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data.extend_from_slice(&self.target.to_le_bytes());
        data.extend_from_slice(&self.nonce.to_le_bytes());
        let first = Sha256::digest(&data);
        Hash256(Sha256::digest(first).into())
    }

    /// Amount of work this header represents, derived from its target.
    ///
    /// Lower targets are harder to hit and therefore count for more work.
    /// Always at least 1, so every block advances cumulative work.
    pub fn block_work(&self) -> u128 {
        (u64::MAX as u128 + 1) / (self.target as u128 + 1)
    }
}

/// A complete block: header plus transactions.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,
    /// Ordered list of transactions. First transaction must be coinbase.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Get the coinbase transaction, if the block is non-empty.
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }

    /// A block is proof-of-stake when its second transaction is a coinstake.
    pub fn is_proof_of_stake(&self) -> bool {
        self.transactions.len() > 1 && self.transactions[1].is_coinstake()
    }

    /// Compute the txid of every transaction in order.
    pub fn txids(&self) -> Result<Vec<Hash256>, TxError> {
        self.transactions.iter().map(|tx| tx.txid()).collect()
    }
}

/// How the output held by a [`Coin`] was created.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub enum CoinOrigin {
    /// Output of an ordinary transaction.
    #[default]
    Transfer,
    /// Output of a coinbase transaction.
    Coinbase,
    /// Output of a coinstake transaction.
    Coinstake,
}

impl CoinOrigin {
    /// Coinbase and coinstake outputs are block-generated and subject to maturity.
    pub fn is_generated(&self) -> bool {
        matches!(self, CoinOrigin::Coinbase | CoinOrigin::Coinstake)
    }
}

/// An entry in the unspent coin set.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Coin {
    /// The unspent output.
    pub output: TxOutput,
    /// Height of the block that created this coin.
    pub height: u64,
    /// Provenance of the output.
    pub origin: CoinOrigin,
}

impl Coin {
    /// Check whether this coin can be spent at `spend_height`.
    ///
    /// Block-generated coins (coinbase and coinstake) require `maturity`
    /// confirmations. Transfer outputs are spendable immediately.
    pub fn is_mature(&self, spend_height: u64, maturity: u64) -> bool {
        if !self.origin.is_generated() {
            return true;
        }
        spend_height.saturating_sub(self.height) >= maturity
    }

    /// Confirmations the coin has at `spend_height`.
    pub fn confirmations(&self, spend_height: u64) -> u64 {
        spend_height.saturating_sub(self.height)
    }
}
