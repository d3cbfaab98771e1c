//! # btclight-consensus: Fork choice, finalization, and SPV verification.
//!
//! [`LightClient`] accepts Bitcoin headers into a [`ChainStore`], tracks
//! competing forks by cumulative work, and moves the checkpoint forward
//! once the best fork is `max_fork_age` blocks ahead of it. The
//! [`checkpoint`] module holds the store-level seeding, fork walk, and
//! finalization steps the engine is built from.
//!
//! [`ChainStore`]: btclight_core::chain_store::ChainStore

pub mod checkpoint;
pub mod engine;

pub use checkpoint::FinalizeOutcome;
pub use engine::{ChangeSet, LightClient};
