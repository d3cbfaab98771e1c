//! Fork-aware header storage interface and in-memory implementation.
//!
//! Provides the [`ChainStore`] trait: every retained [`LightBlock`] indexed
//! by hash, the finalized prefix indexed by height, cumulative work per
//! block, the set of fork heads, the checkpoint, and the cached best fork.
//!
//! Blocks passed to [`ChainStore::add_block`] must already be validated.
//! The store performs no consensus checks; fork selection and pruning live
//! in the consensus crate.

use std::collections::{HashMap, HashSet};

use primitive_types::U256;

use crate::types::{BlockHeader, Hash256, LightBlock};
use crate::work::work_from_bits;

/// Mutable header store spanning all tracked forks.
///
/// Not thread-safe; callers should wrap in a `Mutex` or `RwLock` if
/// concurrent access is needed.
pub trait ChainStore: Send + Sync {
    /// Look up a retained block by hash. `None` means unknown, not an error.
    fn light_block_by_hash(&self, hash: &Hash256) -> Option<LightBlock>;

    /// Look up a finalized block by height.
    ///
    /// Heights above the checkpoint are ambiguous across forks and are
    /// never indexed.
    fn light_block_at_height(&self, height: u64) -> Option<LightBlock>;

    /// Whether `hash` is the tip of a tracked fork.
    fn is_fork_head(&self, hash: &Hash256) -> bool;

    /// Cumulative work up to and including `hash`.
    fn total_work(&self, hash: &Hash256) -> Option<U256>;

    /// Index `lb` with cumulative work `parent_work + work(lb.bits)`.
    ///
    /// Replaces the cached best fork only when the new total is strictly
    /// greater, so the first block to reach a given work keeps the slot.
    /// Returns the stored cumulative work.
    fn set_block(&mut self, lb: LightBlock, parent_work: U256) -> U256;

    /// Toggle membership of `hash` in the fork-head set.
    fn set_fork_head(&mut self, hash: Hash256, is_head: bool);

    /// Record a finalized block in the height index.
    fn set_block_at_height(&mut self, lb: LightBlock);

    /// Replace the checkpoint.
    fn set_checkpoint(&mut self, lb: LightBlock);

    /// The most recently finalized block.
    fn checkpoint(&self) -> Option<LightBlock>;

    /// The fork head with the greatest cumulative work.
    fn best_fork(&self) -> Option<LightBlock>;

    /// Hashes of all fork heads, in no particular order.
    fn fork_head_hashes(&self) -> Vec<Hash256>;

    /// Drop a block and its work entry. Returns the removed block.
    fn remove_block(&mut self, hash: &Hash256) -> Option<LightBlock>;

    /// Number of retained blocks.
    fn block_count(&self) -> usize;

    /// Whether a block with this hash is retained.
    ///
    /// Default implementation delegates to [`light_block_by_hash`](Self::light_block_by_hash).
    fn contains_block(&self, hash: &Hash256) -> bool {
        self.light_block_by_hash(hash).is_some()
    }

    /// Construct and index the child of `parent` carrying `header`.
    ///
    /// The caller has validated `header` and checked that
    /// `header.prev_block == parent.hash()`.
    fn add_block(&mut self, parent: &LightBlock, header: BlockHeader) -> LightBlock {
        let lb = LightBlock::new(parent.height + 1, header);
        let parent_work = self.total_work(&parent.hash()).unwrap_or_default();
        self.set_block(lb, parent_work);
        lb
    }
}

/// Full contents of a store, used to persist and restore it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    /// Every retained block with its cumulative work.
    pub blocks: Vec<(LightBlock, U256)>,
    /// Hashes of finalized blocks indexed by height.
    pub finalized: Vec<(u64, Hash256)>,
    pub fork_heads: Vec<Hash256>,
    pub checkpoint: Option<Hash256>,
    pub best_fork: Option<Hash256>,
}

/// In-memory header store.
///
/// Stores everything in `HashMap`s. The node persists it through its
/// RocksDB adapter and restores it with [`MemoryChainStore::from_snapshot`].
#[derive(Clone, Debug, Default)]
pub struct MemoryChainStore {
    /// Every retained block by hash.
    by_hash: HashMap<Hash256, LightBlock>,
    /// Finalized blocks by height.
    by_height: HashMap<u64, LightBlock>,
    /// Cumulative work by hash.
    work_by_hash: HashMap<Hash256, U256>,
    fork_heads: HashSet<Hash256>,
    checkpoint: Option<LightBlock>,
    best_fork: Option<LightBlock>,
    /// Work of `best_fork`, cached for the strict comparison in `set_block`.
    best_work: U256,
}

impl MemoryChainStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of finalized blocks indexed by height.
    pub fn finalized_count(&self) -> usize {
        self.by_height.len()
    }

    /// Rebuild a store from a snapshot.
    ///
    /// Entries that reference blocks missing from `snapshot.blocks` are
    /// skipped.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let mut store = Self::new();
        for (lb, work) in snapshot.blocks {
            let hash = lb.hash();
            store.by_hash.insert(hash, lb);
            store.work_by_hash.insert(hash, work);
        }
        for (height, hash) in snapshot.finalized {
            if let Some(lb) = store.by_hash.get(&hash).copied() {
                store.by_height.insert(height, lb);
            }
        }
        store.fork_heads = snapshot
            .fork_heads
            .into_iter()
            .filter(|h| store.by_hash.contains_key(h))
            .collect();
        store.checkpoint = snapshot.checkpoint.and_then(|h| store.by_hash.get(&h).copied());
        if let Some(best) = snapshot.best_fork.and_then(|h| store.by_hash.get(&h).copied()) {
            store.best_work = store.work_by_hash.get(&best.hash()).copied().unwrap_or_default();
            store.best_fork = Some(best);
        }
        store
    }

    /// Capture the full store contents.
    pub fn snapshot(&self) -> StoreSnapshot {
        let mut blocks: Vec<(LightBlock, U256)> = self
            .by_hash
            .iter()
            .map(|(h, lb)| (*lb, self.work_by_hash.get(h).copied().unwrap_or_default()))
            .collect();
        blocks.sort_by_key(|(lb, _)| lb.height);
        let mut finalized: Vec<(u64, Hash256)> =
            self.by_height.iter().map(|(h, lb)| (*h, lb.hash())).collect();
        finalized.sort_unstable();
        StoreSnapshot {
            blocks,
            finalized,
            fork_heads: self.fork_head_hashes(),
            checkpoint: self.checkpoint.map(|lb| lb.hash()),
            best_fork: self.best_fork.map(|lb| lb.hash()),
        }
    }
}

impl ChainStore for MemoryChainStore {
    fn light_block_by_hash(&self, hash: &Hash256) -> Option<LightBlock> {
        self.by_hash.get(hash).copied()
    }

    fn light_block_at_height(&self, height: u64) -> Option<LightBlock> {
        self.by_height.get(&height).copied()
    }

    fn is_fork_head(&self, hash: &Hash256) -> bool {
        self.fork_heads.contains(hash)
    }

    fn total_work(&self, hash: &Hash256) -> Option<U256> {
        self.work_by_hash.get(hash).copied()
    }

    fn set_block(&mut self, lb: LightBlock, parent_work: U256) -> U256 {
        let hash = lb.hash();
        let work = parent_work.saturating_add(work_from_bits(lb.header.bits));
        self.by_hash.insert(hash, lb);
        self.work_by_hash.insert(hash, work);

        if self.best_fork.is_none() || work > self.best_work {
            self.best_fork = Some(lb);
            self.best_work = work;
        }
        work
    }

    fn set_fork_head(&mut self, hash: Hash256, is_head: bool) {
        if is_head {
            self.fork_heads.insert(hash);
        } else {
            self.fork_heads.remove(&hash);
        }
    }

    fn set_block_at_height(&mut self, lb: LightBlock) {
        self.by_height.insert(lb.height, lb);
    }

    fn set_checkpoint(&mut self, lb: LightBlock) {
        self.checkpoint = Some(lb);
    }

    fn checkpoint(&self) -> Option<LightBlock> {
        self.checkpoint
    }

    fn best_fork(&self) -> Option<LightBlock> {
        self.best_fork
    }

    fn fork_head_hashes(&self) -> Vec<Hash256> {
        self.fork_heads.iter().copied().collect()
    }

    fn remove_block(&mut self, hash: &Hash256) -> Option<LightBlock> {
        self.work_by_hash.remove(hash);
        self.fork_heads.remove(hash);
        self.by_hash.remove(hash)
    }

    fn block_count(&self) -> usize {
        self.by_hash.len()
    }
}
