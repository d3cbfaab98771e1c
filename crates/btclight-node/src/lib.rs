//! # btclight-node: persistent light client node with JSON-RPC.
//!
//! - [`storage::RocksStore`]: RocksDB mirror of the in-memory chain store
//! - [`node::Node`]: single-writer wrapper around the light client
//! - [`rpc`]: JSON-RPC server for header submission and SPV queries
//! - [`config::NodeConfig`]: layered node configuration

pub mod config;
pub mod node;
pub mod rpc;
pub mod storage;

pub use config::{LogFormat, NodeConfig};
pub use node::{InsertSummary, Node};
pub use rpc::start_rpc_server;
pub use storage::RocksStore;
