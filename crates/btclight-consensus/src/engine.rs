//! Fork-choice engine: header insertion, finalization, and SPV checks.
//!
//! [`LightClient`] owns a [`ChainStore`] and is its only writer. Insertion
//! validates each header against the fork it extends; finalization is a
//! separate step ([`LightClient::finalize`]) that the caller runs after each
//! insert, or once per batch through [`LightClient::insert_and_finalize`].

use std::fmt;

use btclight_core::ancestor::AncestorView;
use btclight_core::chain_store::{ChainStore, MemoryChainStore};
use btclight_core::constants::NetworkParams;
use btclight_core::balance;
use btclight_core::error::{BalanceError, LightClientError, MerkleError};
use btclight_core::header_validation::{self, HeaderContext};
use btclight_core::spv::{self, SpvProof, SpvStatus};
use btclight_core::types::{BlockHeader, Hash256, LightBlock};
use primitive_types::U256;
use tracing::{info, warn};

use crate::checkpoint::{self, FinalizeOutcome};

/// Everything a batch changed in the store, in the order it happened.
///
/// Filled even when the batch stops early, so a persistence layer can write
/// the headers that were accepted before the failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Accepted blocks, in insertion order.
    pub inserted: Vec<LightBlock>,
    /// Blocks added to the height index, lowest first.
    pub finalized: Vec<LightBlock>,
    /// Hashes removed by pruning.
    pub pruned: Vec<Hash256>,
    /// Latest checkpoint, if it moved.
    pub checkpoint: Option<LightBlock>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.pruned.is_empty() && self.checkpoint.is_none()
    }

    fn absorb(&mut self, outcome: FinalizeOutcome) {
        if outcome.checkpoint.is_some() {
            self.checkpoint = outcome.checkpoint;
        }
        self.finalized.extend(outcome.finalized);
        self.pruned.extend(outcome.pruned);
    }
}

/// Bitcoin header light client.
///
/// Tracks every fork that descends from the checkpoint, keeps the best one
/// by cumulative work, and finalizes it once it leads the checkpoint by
/// `max_fork_age` blocks.
pub struct LightClient<S: ChainStore> {
    params: NetworkParams,
    store: S,
    max_fork_age: u64,
    clock: Box<dyn Fn() -> u64 + Send + Sync>,
}

impl<S: ChainStore> fmt::Debug for LightClient<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LightClient")
            .field("network", &self.params.network)
            .field("max_fork_age", &self.max_fork_age)
            .field("blocks", &self.store.block_count())
            .finish_non_exhaustive()
    }
}

impl LightClient<MemoryChainStore> {
    /// Seed an in-memory client from a run of consecutive headers.
    ///
    /// See [`checkpoint::seed`] for where the checkpoint lands.
    pub fn bootstrap(
        params: NetworkParams,
        start_height: u64,
        headers: &[BlockHeader],
        max_fork_age: u64,
    ) -> Result<Self, LightClientError> {
        let mut store = MemoryChainStore::new();
        checkpoint::seed(&mut store, start_height, headers, max_fork_age)?;
        Self::new(params, store, max_fork_age)
    }
}

impl<S: ChainStore> LightClient<S> {
    /// Create a client over `store` using the system clock.
    pub fn new(params: NetworkParams, store: S, max_fork_age: u64) -> Result<Self, LightClientError> {
        Self::with_clock(params, store, max_fork_age, || {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs()
        })
    }

    /// Create a client with a custom clock for testing.
    pub fn with_clock(
        params: NetworkParams,
        store: S,
        max_fork_age: u64,
        clock: impl Fn() -> u64 + Send + Sync + 'static,
    ) -> Result<Self, LightClientError> {
        if max_fork_age == 0 {
            return Err(LightClientError::InvalidMaxForkAge);
        }
        Ok(Self {
            params,
            store,
            max_fork_age,
            clock: Box::new(clock),
        })
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn max_fork_age(&self) -> u64 {
        self.max_fork_age
    }

    /// Read access to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validate `header` and attach it to its parent's fork.
    ///
    /// Extending a fork head moves the head to the new block; attaching to
    /// any other retained block starts a new fork. Does not finalize.
    ///
    /// # Errors
    ///
    /// - [`LightClientError::DuplicateBlock`] if the header is already stored
    /// - [`LightClientError::ParentBlockNotInChain`] if the parent is unknown
    /// - [`LightClientError::ForkTooOld`] if the parent cannot reach the
    ///   checkpoint within `max_fork_age` blocks
    /// - [`LightClientError::Consensus`] if a consensus rule fails
    ///
    /// The store is unchanged on error.
    pub fn insert_header(&mut self, header: BlockHeader) -> Result<LightBlock, LightClientError> {
        let hash = header.hash();
        if self.store.contains_block(&hash) {
            return Err(LightClientError::DuplicateBlock(hash.to_string()));
        }
        let parent = self
            .store
            .light_block_by_hash(&header.prev_block)
            .ok_or_else(|| LightClientError::ParentBlockNotInChain(header.prev_block.to_string()))?;

        // Parent first, checkpoint last.
        let fork = checkpoint::fork_to_checkpoint(&self.store, &parent.hash(), self.max_fork_age)?;
        let view = AncestorView::from_fork(&fork, &self.store).ok_or_else(|| {
            LightClientError::InvariantViolation(format!("empty fork for parent {}", parent.hash()))
        })?;
        let ctx = HeaderContext { parent: view, current_time: (self.clock)() };
        header_validation::validate_header(&self.params, &header, &ctx)?;

        let parent_was_head = self.store.is_fork_head(&parent.hash());
        let lb = self.store.add_block(&parent, header);
        if parent_was_head {
            self.store.set_fork_head(parent.hash(), false);
        }
        self.store.set_fork_head(hash, true);

        info!(height = lb.height, %hash, new_fork = !parent_was_head, "light_client: header accepted");
        Ok(lb)
    }

    /// Insert headers in order without finalizing.
    ///
    /// Stops at the first rejection; headers before it stay inserted.
    ///
    /// # Errors
    ///
    /// [`LightClientError::BatchRejected`] carrying the index and cause.
    pub fn insert_headers(&mut self, headers: &[BlockHeader]) -> Result<Vec<LightBlock>, LightClientError> {
        let mut inserted = Vec::with_capacity(headers.len());
        for (index, header) in headers.iter().enumerate() {
            match self.insert_header(*header) {
                Ok(lb) => inserted.push(lb),
                Err(e) => return Err(reject(index, e)),
            }
        }
        Ok(inserted)
    }

    /// Advance the checkpoint if the best fork is old enough, pruning forks
    /// left behind.
    ///
    /// # Errors
    ///
    /// [`LightClientError::InvariantViolation`] when the store is corrupt.
    pub fn finalize(&mut self) -> Result<FinalizeOutcome, LightClientError> {
        checkpoint::advance(&mut self.store, self.max_fork_age)
    }

    /// Insert each header and finalize after it, recording changes in `changes`.
    ///
    /// Stops at the first rejected header. Headers accepted before it stay
    /// inserted and finalized.
    ///
    /// # Errors
    ///
    /// [`LightClientError::BatchRejected`] for a rejected header, or
    /// [`LightClientError::InvariantViolation`] if finalization fails.
    pub fn insert_and_finalize(
        &mut self,
        headers: &[BlockHeader],
        changes: &mut ChangeSet,
    ) -> Result<(), LightClientError> {
        for (index, header) in headers.iter().enumerate() {
            let lb = self.insert_header(*header).map_err(|e| reject(index, e))?;
            changes.inserted.push(lb);
            changes.absorb(self.finalize()?);
        }
        Ok(())
    }

    /// Check an inclusion proof against the stored header chain.
    pub fn verify_spv(&self, proof: &SpvProof) -> SpvStatus {
        let Some(block) = self.store.light_block_by_hash(&proof.block_hash) else {
            return SpvStatus::Invalid;
        };
        if proof.merkle_root() != Some(block.header.merkle_root) {
            return SpvStatus::Invalid;
        }
        self.finality(&block)
    }

    /// [`verify_spv`](Self::verify_spv) for each proof, in input order.
    pub fn verify_spv_batch(&self, proofs: &[SpvProof]) -> Vec<SpvStatus> {
        proofs.iter().map(|p| self.verify_spv(p)).collect()
    }

    /// Check `txid` against `gettxoutproof` output.
    ///
    /// # Errors
    ///
    /// Any [`MerkleError`] from decoding the proof, including
    /// [`MerkleError::NotInMerkleTree`] when the proof does not cover `txid`.
    pub fn verify_tx_out_proof(&self, proof_hex: &str, txid: &Hash256) -> Result<SpvStatus, MerkleError> {
        let proof = SpvProof::from_tx_out_proof(proof_hex, txid)?;
        Ok(self.verify_spv(&proof))
    }

    /// Check a flat `siblings` path (concatenated 32-byte hashes) for `txid`
    /// at `tx_index` in block `block_hash`.
    pub fn verify_merkle_path(
        &self,
        block_hash: &Hash256,
        txid: &Hash256,
        tx_index: u32,
        siblings: &[u8],
    ) -> SpvStatus {
        let Some(block) = self.store.light_block_by_hash(block_hash) else {
            return SpvStatus::Invalid;
        };
        let mut proof = Vec::with_capacity(64 + siblings.len());
        proof.extend_from_slice(txid.as_bytes());
        proof.extend_from_slice(siblings);
        proof.extend_from_slice(block.header.merkle_root.as_bytes());
        if !spv::verify_hash256_merkle(&proof, tx_index) {
            return SpvStatus::Invalid;
        }
        self.finality(&block)
    }

    /// Satoshis paid to `address` by the raw transaction `tx_hex`, once the
    /// transaction is proven in a finalized block.
    ///
    /// The decoded transaction must hash to `proof.tx_id` and the proof must
    /// be [`SpvStatus::Valid`]. The address is read under this client's
    /// network.
    ///
    /// # Errors
    ///
    /// [`BalanceError::TxIdMismatch`] when the transaction is not the one
    /// proven, [`BalanceError::ProofNotValid`] for an unknown block, a bad
    /// path, or a block above the checkpoint. Decoding and address errors
    /// pass through from [`balance`].
    pub fn verify_balance(&self, tx_hex: &str, address: &str, proof: &SpvProof) -> Result<u64, BalanceError> {
        let tx = balance::decode_transaction(tx_hex)?;
        let txid = balance::transaction_id(&tx);
        if txid != proof.tx_id {
            return Err(BalanceError::TxIdMismatch { tx: txid.to_string(), proof: proof.tx_id.to_string() });
        }
        match self.verify_spv(proof) {
            SpvStatus::Valid => balance::address_balance(&tx, address, self.params.network),
            status => Err(BalanceError::ProofNotValid(status)),
        }
    }

    fn finality(&self, block: &LightBlock) -> SpvStatus {
        match self.store.checkpoint() {
            Some(cp) if block.height <= cp.height => SpvStatus::Valid,
            _ => SpvStatus::PartialValid,
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn contains_block(&self, hash: &Hash256) -> bool {
        self.store.contains_block(hash)
    }

    /// Latest finalized block.
    pub fn checkpoint(&self) -> Option<LightBlock> {
        self.store.checkpoint()
    }

    /// Fork head with the most cumulative work.
    pub fn best_fork(&self) -> Option<LightBlock> {
        self.store.best_fork()
    }

    /// All fork heads, highest first.
    pub fn fork_heads(&self) -> Vec<LightBlock> {
        let mut heads: Vec<LightBlock> = self
            .store
            .fork_head_hashes()
            .iter()
            .filter_map(|h| self.store.light_block_by_hash(h))
            .collect();
        heads.sort_by(|a, b| b.height.cmp(&a.height).then_with(|| a.hash().cmp(&b.hash())));
        heads
    }

    /// Finalized block at `height`.
    pub fn block_at_height(&self, height: u64) -> Option<LightBlock> {
        self.store.light_block_at_height(height)
    }

    pub fn block_by_hash(&self, hash: &Hash256) -> Option<LightBlock> {
        self.store.light_block_by_hash(hash)
    }

    pub fn total_work(&self, hash: &Hash256) -> Option<U256> {
        self.store.total_work(hash)
    }
}

fn reject(index: usize, e: LightClientError) -> LightClientError {
    warn!(index, error = %e, "light_client: header rejected");
    LightClientError::BatchRejected { index, source: Box::new(e) }
}
