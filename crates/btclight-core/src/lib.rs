//! # btclight-core
//! Foundation types for the btclight Bitcoin header light client.
//!
//! Header codec and network parameters, proof-of-work arithmetic, contextual
//! header validation, the fork-aware [`chain_store::ChainStore`], the
//! partial Merkle tree / SPV proof primitives, and the transaction helpers
//! that tie a proven txid to the outputs paying an address. Fork choice
//! and finalization live in `btclight-consensus`.

pub mod ancestor;
pub mod balance;
pub mod bootstrap;
pub mod chain_store;
pub mod constants;
pub mod difficulty;
pub mod error;
pub mod header_validation;
pub mod merkle;
pub mod spv;
pub mod types;
pub mod work;
