//! Error taxonomy.
//!
//! Per-transaction failures ([AdmissionError]) become non-zero response codes
//! and never halt the node. [FatalError] is returned to the process driver,
//! which decides to exit.

use linkchain_types::{execution::ValidationError, GenesisError};
use thiserror::Error;

pub const CODE_OK: u32 = 0;
pub const CODE_INTERNAL: u32 = 1;
pub const CODE_DECODE: u32 = 2;
pub const CODE_VALIDATION: u32 = 3;
pub const CODE_UNKNOWN_ADDRESS: u32 = 4;
pub const CODE_NOT_ENOUGH_BANDWIDTH: u32 = 5;
pub const CODE_EXCEEDED_MAX_BLOCK_BANDWIDTH: u32 = 6;
pub const CODE_EXECUTION: u32 = 7;
pub const CODE_OUT_OF_SEQUENCE: u32 = 8;

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("decode: {0}")]
    Decode(#[from] commonware_codec::Error),
    #[error("validation: {0}")]
    Validation(#[from] ValidationError),
    #[error("unknown address {0}")]
    UnknownAddress(String),
    #[error("not enough bandwidth: remaining {remaining}, cost {cost}")]
    NotEnoughBandwidth { remaining: u64, cost: u64 },
    #[error("exceeded max block bandwidth: spent {spent} + cost {cost} > max {max}")]
    ExceededMaxBlockBandwidth { spent: u64, cost: u64, max: u64 },
    #[error("execution: {0}")]
    Execution(#[from] ExecutionError),
    #[error("out of sequence: {0}")]
    Sequence(#[from] SequenceError),
    #[error("internal: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl AdmissionError {
    pub fn code(&self) -> u32 {
        match self {
            Self::Decode(_) => CODE_DECODE,
            Self::Validation(_) => CODE_VALIDATION,
            Self::UnknownAddress(_) => CODE_UNKNOWN_ADDRESS,
            Self::NotEnoughBandwidth { .. } => CODE_NOT_ENOUGH_BANDWIDTH,
            Self::ExceededMaxBlockBandwidth { .. } => CODE_EXCEEDED_MAX_BLOCK_BANDWIDTH,
            Self::Execution(_) => CODE_EXECUTION,
            Self::Sequence(_) => CODE_OUT_OF_SEQUENCE,
            Self::Internal(_) => CODE_INTERNAL,
        }
    }
}

/// Failure of the underlying validity check or of message execution.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("unknown account {0}")]
    UnknownAccount(String),
    #[error("nonce mismatch: expected {expected}, got {got}")]
    NonceMismatch { expected: u64, got: u64 },
    #[error("insufficient funds: balance {balance}, amount {amount}")]
    InsufficientFunds { balance: u64, amount: u64 },
    #[error("balance overflow")]
    Overflow,
    #[error("linking cost {cost} exceeds remaining bandwidth {remaining}")]
    LinkingCostUnaffordable { remaining: u64, cost: u64 },
    #[error("linking cost {cost} exceeds block bandwidth: spent {spent}, max {max}")]
    LinkingCostExceedsBlock { spent: u64, cost: u64, max: u64 },
    #[error("state: {0:#}")]
    State(#[from] anyhow::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("debit of {cost} exceeds remaining {remaining}")]
    Insufficient { remaining: u64, cost: u64 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GovernorError {
    #[error("adding {cost} to {spent} exceeds max {max}")]
    Exceeded { spent: u64, cost: u64, max: u64 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashError {
    #[error("digest lengths differ: link {link}, rank {rank}")]
    LengthMismatch { link: usize, rank: usize },
    #[error("digests refer to different heights: link {link}, rank {rank}")]
    HeightMismatch { link: u64, rank: u64 },
}

/// Block call issued in the wrong order.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SequenceError {
    #[error("chain is not initialized")]
    NotInitialized,
    #[error("chain is already initialized")]
    AlreadyInitialized,
    #[error("no block in progress")]
    NoBlock,
    #[error("block {0} already in progress")]
    BlockInProgress(u64),
    #[error("block {0} has not ended")]
    BlockNotEnded(u64),
    #[error("expected block {expected}, got {got}")]
    UnexpectedHeight { expected: u64, got: u64 },
}

/// Conditions after which the node must not continue.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("malformed genesis: {0}")]
    MalformedGenesis(#[from] GenesisError),
    #[error("validator set mismatch: {0}")]
    ValidatorSetMismatch(String),
    #[error("unsupported bandwidth model version {0}")]
    UnsupportedModel(u16),
    #[error("chain parameters missing from committed state at height {0}")]
    MissingParams(u64),
    #[error("cannot reconstruct state at round boundary {boundary}: {source:#}")]
    UnreconstructableSnapshot {
        boundary: u64,
        source: anyhow::Error,
    },
    #[error("invariant broken at height {height}: {reason}")]
    InvariantBroken { height: u64, reason: String },
    #[error("state hash: {0}")]
    Hash(#[from] HashError),
    #[error("storage: {0:#}")]
    Storage(#[from] anyhow::Error),
}

/// Failure of a block-level call.
#[derive(Debug, Error)]
pub enum BlockError {
    #[error(transparent)]
    Sequence(#[from] SequenceError),
    #[error(transparent)]
    Fatal(#[from] FatalError),
}
