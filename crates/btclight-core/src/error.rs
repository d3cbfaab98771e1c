//! Error types for the btclight light client.
use thiserror::Error;

use crate::spv::SpvStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("invalid header size: expected 80 bytes, got {got}")] InvalidHeaderSize { got: usize },
    #[error("invalid hex: {0}")] InvalidHex(String),
    #[error("invalid hash: {0}")] InvalidHash(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("difficulty bits {0:#010x} do not encode a valid target")] BadDifficultyBits(u32),
    #[error("block hash {0} is above its target")] HighHash(String),
    #[error("unexpected difficulty: got {got:#010x}, expected {expected:#010x}")] UnexpectedDifficulty { got: u32, expected: u32 },
    #[error("timestamp {timestamp} is not after median time past {median}")] TimeTooOld { timestamp: u32, median: u32 },
    #[error("timestamp {timestamp} is too far in the future (max {max})")] TimeTooNew { timestamp: u32, max: u64 },
    #[error("obsolete version {version} at height {height}")] ObsoleteVersion { version: i32, height: u64 },
    #[error("missing ancestor at height {0}")] MissingAncestor(u64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LightClientError {
    #[error("duplicate block: {0}")] DuplicateBlock(String),
    #[error("parent block not in chain: {0}")] ParentBlockNotInChain(String),
    #[error("fork too old: {0}")] ForkTooOld(String),
    #[error(transparent)] Consensus(#[from] ConsensusError),
    #[error("header {index} rejected: {source}")] BatchRejected { index: usize, source: Box<LightClientError> },
    #[error("bootstrap requires at least one header")] EmptyBootstrap,
    #[error("bootstrap header {index} does not extend its predecessor")] BootstrapNotChained { index: usize },
    #[error("max fork age must be positive")] InvalidMaxForkAge,
    #[error("chain store invariant violated: {0}")] InvariantViolation(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("partial merkle tree has no transactions")] NoTransactions,
    #[error("too many transactions: {0}")] TooManyTransactions(u32),
    #[error("too many hashes: {count}")] TooManyHashes { count: u64 },
    #[error("too many flag bytes: {count}")] TooManyFlagBytes { count: u64 },
    #[error("non-canonical varint encoding of {0}")] NonCanonicalVarInt(u64),
    #[error("unexpected end of proof data")] UnexpectedEof,
    #[error("proof ran out of flag bits or hashes")] TruncatedProof,
    #[error("duplicate sibling hash: {0}")] DuplicateSiblingHash(String),
    #[error("{0} hashes left unused")] UnusedHashes(usize),
    #[error("flag bits left unused")] UnusedBits,
    #[error("{0} trailing bytes after proof")] TrailingData(usize),
    #[error("transaction not in merkle tree: {0}")] NotInMerkleTree(String),
    #[error("invalid hex: {0}")] InvalidHex(String),
    #[error(transparent)] Header(#[from] HeaderError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    #[error("cannot read bootstrap file: {0}")] Io(String),
    #[error("malformed bootstrap json: {0}")] Json(String),
    #[error("network {0} not found")] UnknownNetwork(String),
    #[error("bootstrap header {index}: {source}")] Header { index: usize, source: HeaderError },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BalanceError {
    #[error("invalid transaction: {0}")] InvalidTransaction(String),
    #[error("transaction {tx} does not match proof txid {proof}")] TxIdMismatch { tx: String, proof: String },
    #[error("invalid address: {0}")] InvalidAddress(String),
    #[error("no address encoding for network {0}")] UnsupportedNetwork(String),
    #[error("spv proof is {0:?}, not valid")] ProofNotValid(SpvStatus),
    #[error("output total overflows")] AmountOverflow,
}

#[derive(Error, Debug)]
pub enum BtcLightError {
    #[error(transparent)] Header(#[from] HeaderError),
    #[error(transparent)] Consensus(#[from] ConsensusError),
    #[error(transparent)] LightClient(#[from] LightClientError),
    #[error(transparent)] Merkle(#[from] MerkleError),
    #[error(transparent)] Bootstrap(#[from] BootstrapError),
    #[error(transparent)] Balance(#[from] BalanceError),
    #[error("storage: {0}")] Storage(String),
}
