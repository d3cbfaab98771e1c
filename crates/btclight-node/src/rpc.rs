//! JSON-RPC server for the btclight node.
//!
//! Uses jsonrpsee 0.24. Hashes travel in display (byte-reversed) hex, headers
//! as 160-character wire hex. Every call that touches the node runs on the
//! blocking pool, since the client lock is a blocking `parking_lot` lock held
//! for whole header batches.

use std::sync::Arc;

use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use serde::{Deserialize, Serialize};

use btclight_core::error::{BalanceError, BtcLightError, LightClientError};
use btclight_core::spv::{SpvProof, SpvStatus};
use btclight_core::types::{BlockHeader, Hash256};

use crate::node::Node;

/// Invalid method parameters (bad hex, bad hash).
pub const INVALID_PARAMS: i32 = -32602;
/// A header was rejected by the light client.
pub const REJECTED_HEADER: i32 = -32001;
/// Storage or invariant failure inside the node.
pub const INTERNAL_ERROR: i32 = -32603;
/// The proof behind a balance query is not final.
pub const PROOF_NOT_VALID: i32 = -32002;

/// Block identity returned by tip queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRefJson {
    pub height: u64,
    /// Block hash in display order.
    pub hash: String,
}

/// Best fork head with its cumulative work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestForkJson {
    pub height: u64,
    pub hash: String,
    /// Cumulative work as a `0x`-prefixed hex integer.
    pub total_work: String,
}

/// Response to `insert_headers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertHeadersJson {
    pub inserted: usize,
    pub checkpoint_height: u64,
}

/// Error data attached to a rejected `insert_headers` batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedHeaderJson {
    /// Position of the failing header in the request.
    pub index: usize,
}

/// Error data attached to a balance query whose proof is not final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStatusJson {
    pub status: SpvStatus,
}

/// Parse a 64-character display-order hex string into a Hash256.
pub fn parse_hash(hex_str: &str) -> Result<Hash256, ErrorObjectOwned> {
    hex_str
        .parse()
        .map_err(|e| rpc_error(INVALID_PARAMS, &format!("invalid hash: {e}")))
}

/// Create a JSON-RPC error.
fn rpc_error(code: i32, msg: &str) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(code, msg.to_string(), None::<()>)
}

/// Map a node error to a JSON-RPC error object.
fn node_error(e: BtcLightError) -> ErrorObjectOwned {
    match e {
        BtcLightError::LightClient(LightClientError::BatchRejected { index, source }) => {
            ErrorObjectOwned::owned(REJECTED_HEADER, source.to_string(), Some(RejectedHeaderJson { index }))
        }
        BtcLightError::LightClient(LightClientError::InvariantViolation(msg)) => {
            rpc_error(INTERNAL_ERROR, &msg)
        }
        BtcLightError::LightClient(e) => rpc_error(REJECTED_HEADER, &e.to_string()),
        e => rpc_error(INTERNAL_ERROR, &e.to_string()),
    }
}

/// Map a balance error to a JSON-RPC error object.
fn balance_error(e: BalanceError) -> ErrorObjectOwned {
    match e {
        BalanceError::ProofNotValid(status) => {
            ErrorObjectOwned::owned(PROOF_NOT_VALID, e.to_string(), Some(ProofStatusJson { status }))
        }
        e => rpc_error(INVALID_PARAMS, &e.to_string()),
    }
}

/// Run `f` against the node on the blocking pool.
async fn with_node<T, F>(node: &Arc<Node>, f: F) -> Result<T, ErrorObjectOwned>
where
    F: FnOnce(&Node) -> T + Send + 'static,
    T: Send + 'static,
{
    let node = Arc::clone(node);
    tokio::task::spawn_blocking(move || f(&node))
        .await
        .map_err(|e| rpc_error(INTERNAL_ERROR, &e.to_string()))
}

/// The btclight JSON-RPC interface.
#[rpc(server)]
pub trait BtcLightRpc {
    /// Echoes `n`; used as a liveness check.
    #[method(name = "ping")]
    async fn ping(&self, n: u64) -> Result<u64, ErrorObjectOwned>;

    /// Inserts and finalizes hex-encoded headers in order.
    #[method(name = "insert_headers")]
    async fn insert_headers(&self, headers: Vec<String>) -> Result<InsertHeadersJson, ErrorObjectOwned>;

    /// Returns the latest finalized block.
    #[method(name = "get_btc_header_chain_tip")]
    async fn get_btc_header_chain_tip(&self) -> Result<BlockRefJson, ErrorObjectOwned>;

    /// Returns the fork head with the most work.
    #[method(name = "get_best_fork")]
    async fn get_best_fork(&self) -> Result<BestForkJson, ErrorObjectOwned>;

    /// Whether the block is retained by the light client.
    #[method(name = "contains_btc_block")]
    async fn contains_btc_block(&self, hash: String) -> Result<bool, ErrorObjectOwned>;

    /// Returns the finalized header at `height` as hex.
    #[method(name = "get_header")]
    async fn get_header(&self, height: u64) -> Result<String, ErrorObjectOwned>;

    #[method(name = "verify_spv")]
    async fn verify_spv(&self, proof: SpvProof) -> Result<SpvStatus, ErrorObjectOwned>;

    #[method(name = "verify_spv_batch")]
    async fn verify_spv_batch(&self, proofs: Vec<SpvProof>) -> Result<Vec<SpvStatus>, ErrorObjectOwned>;

    /// Verifies `txid` against `gettxoutproof` output.
    #[method(name = "verify_tx_out_proof")]
    async fn verify_tx_out_proof(&self, proof: String, txid: String) -> Result<SpvStatus, ErrorObjectOwned>;

    /// Satoshis the raw transaction pays to `address`, once `proof` shows it
    /// in a finalized block.
    #[method(name = "verify_balance")]
    async fn verify_balance(&self, tx: String, address: String, proof: SpvProof) -> Result<u64, ErrorObjectOwned>;
}

/// Implementation of the btclight JSON-RPC server.
pub struct RpcServerImpl {
    node: Arc<Node>,
}

impl RpcServerImpl {
    /// Create a new RPC server implementation wrapping the given node.
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }
}

#[async_trait]
impl BtcLightRpcServer for RpcServerImpl {
    async fn ping(&self, n: u64) -> Result<u64, ErrorObjectOwned> {
        Ok(n)
    }

    async fn insert_headers(&self, headers: Vec<String>) -> Result<InsertHeadersJson, ErrorObjectOwned> {
        let decoded = headers
            .iter()
            .enumerate()
            .map(|(index, hex)| {
                BlockHeader::from_hex(hex).map_err(|e| {
                    ErrorObjectOwned::owned(
                        INVALID_PARAMS,
                        format!("header {index}: {e}"),
                        Some(RejectedHeaderJson { index }),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let summary = with_node(&self.node, move |node| node.insert_headers(&decoded))
            .await?
            .map_err(node_error)?;

        Ok(InsertHeadersJson {
            inserted: summary.inserted,
            checkpoint_height: summary.checkpoint_height,
        })
    }

    async fn get_btc_header_chain_tip(&self) -> Result<BlockRefJson, ErrorObjectOwned> {
        let cp = with_node(&self.node, |node| node.checkpoint())
            .await?
            .ok_or_else(|| rpc_error(INTERNAL_ERROR, "no checkpoint"))?;
        Ok(BlockRefJson { height: cp.height, hash: cp.hash().to_string() })
    }

    async fn get_best_fork(&self) -> Result<BestForkJson, ErrorObjectOwned> {
        let (best, work) = with_node(&self.node, |node| node.best_fork())
            .await?
            .ok_or_else(|| rpc_error(INTERNAL_ERROR, "no best fork"))?;
        Ok(BestForkJson {
            height: best.height,
            hash: best.hash().to_string(),
            total_work: format!("{work:#x}"),
        })
    }

    async fn contains_btc_block(&self, hash: String) -> Result<bool, ErrorObjectOwned> {
        let hash = parse_hash(&hash)?;
        with_node(&self.node, move |node| node.contains_block(&hash)).await
    }

    async fn get_header(&self, height: u64) -> Result<String, ErrorObjectOwned> {
        with_node(&self.node, move |node| node.header_at_height(height))
            .await?
            .map(|h| h.to_hex())
            .ok_or_else(|| rpc_error(INVALID_PARAMS, "height not finalized"))
    }

    async fn verify_spv(&self, proof: SpvProof) -> Result<SpvStatus, ErrorObjectOwned> {
        with_node(&self.node, move |node| node.verify_spv(&proof)).await
    }

    async fn verify_spv_batch(&self, proofs: Vec<SpvProof>) -> Result<Vec<SpvStatus>, ErrorObjectOwned> {
        with_node(&self.node, move |node| node.verify_spv_batch(&proofs)).await
    }

    async fn verify_tx_out_proof(&self, proof: String, txid: String) -> Result<SpvStatus, ErrorObjectOwned> {
        let txid = parse_hash(&txid)?;
        with_node(&self.node, move |node| node.verify_tx_out_proof(&proof, &txid))
            .await?
            .map_err(|e| rpc_error(INVALID_PARAMS, &e.to_string()))
    }

    async fn verify_balance(&self, tx: String, address: String, proof: SpvProof) -> Result<u64, ErrorObjectOwned> {
        with_node(&self.node, move |node| node.verify_balance(&tx, &address, &proof))
            .await?
            .map_err(balance_error)
    }
}

/// Start the JSON-RPC server on the given address.
///
/// Returns a [`ServerHandle`] that can be used to stop the server.
pub async fn start_rpc_server(addr: &str, node: Arc<Node>) -> Result<ServerHandle, BtcLightError> {
    let server = Server::builder()
        .build(addr)
        .await
        .map_err(|e| BtcLightError::Storage(format!("RPC server error: {e}")))?;

    let rpc_impl = RpcServerImpl::new(node);
    let handle = server.start(rpc_impl.into_rpc());

    Ok(handle)
}
