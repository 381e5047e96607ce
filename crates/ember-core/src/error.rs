//! Error types for the Ember validation engine.
//!
//! Errors are split into consensus failures (deterministic verdicts on a block
//! or transaction) and engine failures (storage faults, shutdown, transient
//! conditions). Consensus failures carry a peer penalty score; engine failures
//! never penalize a peer.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    #[error("empty inputs or outputs")] EmptyInputsOrOutputs,
    #[error("zero-value output at index {0}")] ZeroValueOutput(usize),
    #[error("value overflow")] ValueOverflow,
    #[error("oversized: {size} > {max}")] OversizedTransaction { size: usize, max: usize },
    #[error("too many inputs or outputs")] TooManyInputsOrOutputs,
    #[error("duplicate input: {0}")] DuplicateInput(String),
    #[error("null outpoint in non-coinbase input {0}")] NullOutpointInRegularTx(usize),
    #[error("invalid coinbase: {0}")] InvalidCoinbase(String),
    #[error("invalid coinstake: {0}")] InvalidCoinstake(String),
    #[error("bad signature encoding on input {index}")] BadSignatureEncoding { index: usize },
    #[error("invalid signature on input {index}")] InvalidSignature { index: usize },
    #[error("unknown coin: {0}")] UnknownCoin(String),
    #[error("immature coin at input {index}: {confirmations} of {required} confirmations")]
    ImmatureCoin { index: usize, confirmations: u64, required: u64 },
    #[error("insufficient funds: have {have}, need {need}")] InsufficientFunds { have: u64, need: u64 },
    #[error("not final at height {height}")] NotFinal { height: u64 },
    #[error("serialization: {0}")] Serialization(String),
}

impl TxError {
    /// Peer penalty score for relaying a transaction with this fault.
    ///
    /// Structural faults score 100, contextual faults (dependent on chain
    /// state) score lower, missing-input conditions score zero because the
    /// relay peer may simply be ahead or behind us.
    pub fn penalty(&self) -> u32 {
        match self {
            Self::EmptyInputsOrOutputs
            | Self::ZeroValueOutput(_)
            | Self::ValueOverflow
            | Self::OversizedTransaction { .. }
            | Self::TooManyInputsOrOutputs
            | Self::DuplicateInput(_)
            | Self::NullOutpointInRegularTx(_)
            | Self::InvalidCoinbase(_)
            | Self::InvalidCoinstake(_)
            | Self::BadSignatureEncoding { .. }
            | Self::InvalidSignature { .. } => 100,
            Self::ImmatureCoin { .. }
            | Self::InsufficientFunds { .. }
            | Self::NotFinal { .. } => 10,
            Self::UnknownCoin(_) | Self::Serialization(_) => 0,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("no coinbase")] NoCoinbase,
    #[error("first transaction is not coinbase")] FirstTxNotCoinbase,
    #[error("multiple coinbase transactions")] MultipleCoinbase,
    #[error("coinstake at index {0}, only index 1 is allowed")] CoinstakeOutOfPlace(usize),
    #[error("proof-of-stake block at height {height}, activation at {activation}")]
    StakeBeforeActivation { height: u64, activation: u64 },
    #[error("coinbase pays {got} in a proof-of-stake block, must be empty")]
    NonEmptyStakeCoinbase { got: u64 },
    #[error("duplicate txid: {0}")] DuplicateTxid(String),
    #[error("invalid merkle root")] InvalidMerkleRoot,
    #[error("oversized: {size} > {max}")] OversizedBlock { size: usize, max: usize },
    #[error("header hash does not meet target")] BadProof,
    #[error("target {got} easier than limit {limit}")] TargetAboveLimit { got: u64, limit: u64 },
    #[error("timestamp too far in the future: {0}s past drift limit")] TimestampTooFar(u64),
    #[error("timestamp not after parent")] TimestampNotAfterParent,
    #[error("obsolete version {got}, minimum {min}")] ObsoleteVersion { got: u64, min: u64 },
    #[error("checkpoint mismatch at height {height}")] CheckpointMismatch { height: u64 },
    #[error("double spend across transactions: {0}")] DoubleSpend(String),
    #[error("coinbase pays {got}, maximum {allowed}")] ExcessIssuance { got: u64, allowed: u64 },
    #[error("stake reward {got}, maximum {allowed}")] ExcessStakeReward { got: u64, allowed: u64 },
    #[error("tx error in {index}: {source}")] Tx { index: usize, source: TxError },
    #[error("unknown parent: {0}")] UnknownParent(String),
    #[error("builds on an invalid block: {0}")] BadAncestor(String),
}

impl BlockError {
    /// Peer penalty score for relaying a block with this fault.
    ///
    /// `UnknownParent` is transient (the parent may arrive later) and never
    /// penalized. Contextual faults score less than structural ones.
    pub fn penalty(&self) -> u32 {
        match self {
            Self::UnknownParent(_) => 0,
            Self::TimestampTooFar(_) => 0,
            Self::CheckpointMismatch { .. } | Self::ObsoleteVersion { .. } => 50,
            Self::Tx { source, .. } => source.penalty(),
            _ => 100,
        }
    }

    /// Whether the block may become valid later without changing a byte.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::UnknownParent(_) | Self::TimestampTooFar(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key bytes")] InvalidPublicKey,
    #[error("invalid signature bytes")] InvalidSignature,
    #[error("signature verification failed")] VerificationFailed,
    #[error("pubkey hash does not match expected")] PubkeyHashMismatch,
    #[error("input index out of bounds: {index} >= {len}")] InputIndexOutOfBounds { index: usize, len: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error("transaction already in pool: {0}")] AlreadyKnown(String),
    #[error("conflicts with pool tx {existing_txid} on outpoint {outpoint}")]
    Conflict { new_txid: String, existing_txid: String, outpoint: String },
    #[error("missing inputs: {0}")] MissingInputs(String),
    #[error("fee {fee} below minimum {minimum}")] FeeTooLow { fee: u64, minimum: u64 },
    #[error("ancestor chain too long: {count} > {limit}")] TooManyAncestors { count: usize, limit: usize },
    #[error("ancestor size {size} exceeds {limit}")] AncestorSizeExceeded { size: usize, limit: usize },
    #[error("descendant chain too long: {count} > {limit}")] TooManyDescendants { count: usize, limit: usize },
    #[error("descendant size {size} exceeds {limit}")] DescendantSizeExceeded { size: usize, limit: usize },
    #[error("coinbase or coinstake cannot enter the pool")] GeneratedTx,
    #[error("pool full")] PoolFull,
    #[error(transparent)] Tx(#[from] TxError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("block not found: {0}")] BlockNotFound(String),
    #[error("coin not found: {0}")] CoinNotFound(String),
    #[error("undo data missing for block: {0}")] UndoDataMissing(String),
    #[error("undo data corrupt for block {hash}: {detail}")] CorruptUndo { hash: String, detail: String },
    #[error("height mismatch: expected {expected}, got {got}")] HeightMismatch { expected: u64, got: u64 },
    #[error("reorganization depth {depth} exceeds limit {max}")] DeepReorg { depth: u64, max: u64 },
    #[error("duplicate block: {0}")] DuplicateBlock(String),
    #[error("shutdown requested")] Shutdown,
    #[error("storage: {0}")] Storage(String),
}

impl ChainError {
    /// Storage faults and corrupt undo data cannot be recovered in-process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::CorruptUndo { .. })
    }
}

#[derive(Error, Debug)]
pub enum EmberError {
    #[error(transparent)] Tx(#[from] TxError),
    #[error(transparent)] Block(#[from] BlockError),
    #[error(transparent)] Crypto(#[from] CryptoError),
    #[error(transparent)] Mempool(#[from] MempoolError),
    #[error(transparent)] Chain(#[from] ChainError),
    #[error("config: {0}")] Config(String),
    #[error("decode: {0}")] Decode(String),
    #[error("io: {0}")] Io(String),
}

impl From<std::io::Error> for EmberError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
