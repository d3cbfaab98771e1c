//! Light client node composition.
//!
//! The [`Node`] owns the [`LightClient`] behind a `RwLock` and mirrors every
//! write batch into RocksDB before the lock is released. Header insertion is
//! the only writer; tip queries and SPV verification share the read lock.
//! A failed disk write halts the write path, since later change sets would
//! build on blocks the database never received.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use primitive_types::U256;
use tracing::{error, info, warn};

use btclight_consensus::{ChangeSet, LightClient, checkpoint};
use btclight_core::bootstrap::{self, Bootstrap};
use btclight_core::chain_store::{ChainStore, MemoryChainStore};
use btclight_core::error::{BalanceError, BtcLightError, LightClientError, MerkleError};
use btclight_core::spv::{SpvProof, SpvStatus};
use btclight_core::types::{BlockHeader, Hash256, LightBlock};

use crate::config::NodeConfig;
use crate::storage::RocksStore;

/// Result of a successful [`Node::insert_headers`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertSummary {
    pub inserted: usize,
    pub checkpoint_height: u64,
}

/// A running light client with durable storage.
pub struct Node {
    client: RwLock<LightClient<MemoryChainStore>>,
    storage: RocksStore,
    /// Set once the chain store is found corrupt or a disk write fails; no
    /// further writes run.
    halted: AtomicBool,
    config: NodeConfig,
}

impl Node {
    /// Open the node's database, seeding it from `config.bootstrap_path`
    /// when it is empty.
    pub fn open(config: NodeConfig) -> Result<Arc<Self>, BtcLightError> {
        let bootstrap = match &config.bootstrap_path {
            Some(path) => Some(bootstrap::load(path)?),
            None => None,
        };
        Self::open_with(config, bootstrap)
    }

    /// Open the node's database, seeding it from `bootstrap` when it is empty.
    ///
    /// A non-empty database always wins over the bootstrap data.
    pub fn open_with(config: NodeConfig, bootstrap: Option<Bootstrap>) -> Result<Arc<Self>, BtcLightError> {
        let storage = RocksStore::open(config.db_path())?;

        let store = if storage.is_empty()? {
            let bootstrap = bootstrap.ok_or_else(|| {
                BtcLightError::Storage("empty database and no bootstrap data".into())
            })?;
            if bootstrap.network != config.network {
                return Err(BtcLightError::Storage(format!(
                    "bootstrap is for {}, node is configured for {}",
                    bootstrap.network, config.network
                )));
            }
            let mut store = MemoryChainStore::new();
            checkpoint::seed(&mut store, bootstrap.start_height, &bootstrap.headers, config.max_fork_age)?;
            storage.persist_snapshot(&store.snapshot())?;
            info!(
                network = %config.network,
                start_height = bootstrap.start_height,
                headers = bootstrap.headers.len(),
                "node: seeded from bootstrap"
            );
            store
        } else {
            let store = storage.load()?;
            info!(network = %config.network, blocks = store.block_count(), "node: restored chain store");
            store
        };

        let client = LightClient::new(config.network.params(), store, config.max_fork_age)?;
        if let Some(cp) = client.checkpoint() {
            info!(height = cp.height, hash = %cp.hash(), "node: checkpoint");
        }

        Ok(Arc::new(Self {
            client: RwLock::new(client),
            storage,
            halted: AtomicBool::new(false),
            config,
        }))
    }

    /// Insert and finalize `headers` in order, then persist what changed.
    ///
    /// Headers accepted before a rejected one stay inserted and are persisted.
    /// A chain store invariant violation or a failed disk write halts all
    /// later writes; reads keep serving the in-memory store.
    pub fn insert_headers(&self, headers: &[BlockHeader]) -> Result<InsertSummary, BtcLightError> {
        let mut client = self.client.write();
        if self.halted.load(Ordering::Acquire) {
            return Err(BtcLightError::Storage("write path halted".into()));
        }

        let mut changes = ChangeSet::default();
        let result = client.insert_and_finalize(headers, &mut changes);

        if !changes.is_empty() {
            if let Err(e) = self.storage.persist(&changes, client.store()) {
                self.halted.store(true, Ordering::Release);
                error!(
                    error = %e,
                    inserted = changes.inserted.len(),
                    "node: persist failed, database behind memory, halting writes"
                );
                return Err(e);
            }
        }

        match result {
            Ok(()) => {
                let checkpoint_height = client.checkpoint().map(|lb| lb.height).unwrap_or_default();
                Ok(InsertSummary { inserted: changes.inserted.len(), checkpoint_height })
            }
            Err(LightClientError::InvariantViolation(msg)) => {
                self.halted.store(true, Ordering::Release);
                error!(%msg, "node: chain store corrupt, halting writes");
                Err(LightClientError::InvariantViolation(msg).into())
            }
            Err(e) => {
                if !changes.inserted.is_empty() {
                    warn!(accepted = changes.inserted.len(), "node: batch partially applied");
                }
                Err(e.into())
            }
        }
    }

    /// Whether a store corruption or a failed disk write stopped the write path.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    // --- Query methods for RPC ---

    /// Latest finalized block.
    pub fn checkpoint(&self) -> Option<LightBlock> {
        self.client.read().checkpoint()
    }

    /// Best fork head and its cumulative work.
    pub fn best_fork(&self) -> Option<(LightBlock, U256)> {
        let client = self.client.read();
        let best = client.best_fork()?;
        let work = client.total_work(&best.hash())?;
        Some((best, work))
    }

    pub fn fork_heads(&self) -> Vec<LightBlock> {
        self.client.read().fork_heads()
    }

    pub fn contains_block(&self, hash: &Hash256) -> bool {
        self.client.read().contains_block(hash)
    }

    /// Finalized header at `height`.
    pub fn header_at_height(&self, height: u64) -> Option<BlockHeader> {
        self.client.read().block_at_height(height).map(|lb| lb.header)
    }

    pub fn verify_spv(&self, proof: &SpvProof) -> SpvStatus {
        self.client.read().verify_spv(proof)
    }

    pub fn verify_spv_batch(&self, proofs: &[SpvProof]) -> Vec<SpvStatus> {
        self.client.read().verify_spv_batch(proofs)
    }

    pub fn verify_tx_out_proof(&self, proof_hex: &str, txid: &Hash256) -> Result<SpvStatus, MerkleError> {
        self.client.read().verify_tx_out_proof(proof_hex, txid)
    }

    /// Satoshis `tx_hex` pays to `address`, once proven final by `proof`.
    pub fn verify_balance(&self, tx_hex: &str, address: &str, proof: &SpvProof) -> Result<u64, BalanceError> {
        self.client.read().verify_balance(tx_hex, address, proof)
    }

    /// Node configuration reference.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Hold the client's write lock as a header batch would.
    #[cfg(test)]
    pub(crate) fn lock_for_write(&self) -> parking_lot::RwLockWriteGuard<'_, LightClient<MemoryChainStore>> {
        self.client.write()
    }

    /// Flush RocksDB buffers; called on shutdown.
    pub fn flush(&self) -> Result<(), BtcLightError> {
        self.storage.flush()
    }
}
