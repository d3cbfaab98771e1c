//! Checkpoint seeding, fork walks, and finalization.
//!
//! The checkpoint is the newest finalized block. Every retained fork must
//! reach it within `max_fork_age` steps; anything that cannot is either
//! rejected at insertion ([`fork_to_checkpoint`]) or pruned when the
//! checkpoint advances ([`advance`]).
//!
//! # Attack vectors
//!
//! - **Deep fork:** A header anchored far below the checkpoint would let an
//!   attacker grow an alternative history out of view of finalization. The
//!   bounded walk rejects it before any validation work is spent.
//! - **Memory growth:** Branches that lose the race are deleted as soon as the
//!   checkpoint moves past their divergence point, so the unfinalized region
//!   holds at most `max_fork_age` blocks per live fork.

use std::collections::HashSet;

use btclight_core::chain_store::ChainStore;
use btclight_core::error::LightClientError;
use btclight_core::types::{BlockHeader, Hash256, LightBlock};
use primitive_types::U256;
use tracing::{debug, error, info};

/// Store changes made by one [`advance`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizeOutcome {
    /// The new checkpoint, if it moved.
    pub checkpoint: Option<LightBlock>,
    /// Blocks newly added to the height index, lowest first.
    pub finalized: Vec<LightBlock>,
    /// Hashes removed from the store.
    pub pruned: Vec<Hash256>,
}

impl FinalizeOutcome {
    /// Whether the call left the store untouched.
    pub fn is_noop(&self) -> bool {
        self.checkpoint.is_none() && self.pruned.is_empty()
    }
}

/// Seed an empty store with a run of consecutive headers.
///
/// `headers[0]` lands at `start_height` and carries only its own work. The
/// checkpoint is placed `max_fork_age - 1` blocks below the last header (or
/// on `headers[0]` for shorter runs), which is where [`advance`] would put it.
/// Everything up to the checkpoint is height-indexed and the last header is
/// the only fork head. Headers are not validated.
///
/// # Errors
///
/// - [`LightClientError::InvalidMaxForkAge`] if `max_fork_age` is zero
/// - [`LightClientError::EmptyBootstrap`] if `headers` is empty
/// - [`LightClientError::BootstrapNotChained`] if a header does not name its predecessor
pub fn seed<S: ChainStore + ?Sized>(
    store: &mut S,
    start_height: u64,
    headers: &[BlockHeader],
    max_fork_age: u64,
) -> Result<(), LightClientError> {
    if max_fork_age == 0 {
        return Err(LightClientError::InvalidMaxForkAge);
    }
    let (first, rest) = headers.split_first().ok_or(LightClientError::EmptyBootstrap)?;
    for (index, pair) in headers.windows(2).enumerate() {
        if pair[1].prev_block != pair[0].hash() {
            return Err(LightClientError::BootstrapNotChained { index: index + 1 });
        }
    }

    let checkpoint_index = headers.len().saturating_sub(max_fork_age as usize);

    let base = LightBlock::new(start_height, *first);
    store.set_block(base, U256::zero());
    store.set_block_at_height(base);
    store.set_checkpoint(base);

    let mut parent = base;
    for (offset, header) in rest.iter().enumerate() {
        let index = offset + 1;
        let lb = store.add_block(&parent, *header);
        if index <= checkpoint_index {
            store.set_block_at_height(lb);
        }
        if index == checkpoint_index {
            store.set_checkpoint(lb);
        }
        parent = lb;
    }
    store.set_fork_head(parent.hash(), true);

    info!(
        start_height,
        count = headers.len(),
        checkpoint = checkpoint_index as u64 + start_height,
        "checkpoint: store seeded"
    );
    Ok(())
}

/// Collect the blocks from `from` back to the checkpoint, inclusive.
///
/// At most `max_fork_age + 1` blocks are visited. The result starts with
/// `from` and ends with the checkpoint.
///
/// # Errors
///
/// [`LightClientError::ForkTooOld`] when the walk drops below the checkpoint,
/// passes its height on another branch, meets a block that is not retained,
/// or runs out of steps.
pub fn fork_to_checkpoint<S: ChainStore + ?Sized>(
    store: &S,
    from: &Hash256,
    max_fork_age: u64,
) -> Result<Vec<LightBlock>, LightClientError> {
    let checkpoint = store
        .checkpoint()
        .ok_or_else(|| LightClientError::InvariantViolation("store has no checkpoint".into()))?;
    let checkpoint_hash = checkpoint.hash();
    let too_old = || LightClientError::ForkTooOld(from.to_string());

    let mut fork = Vec::new();
    let mut hash = *from;
    for _ in 0..=max_fork_age {
        let current = store.light_block_by_hash(&hash).ok_or_else(too_old)?;
        if current.height < checkpoint.height {
            return Err(too_old());
        }
        fork.push(current);
        if hash == checkpoint_hash {
            return Ok(fork);
        }
        if current.height == checkpoint.height {
            return Err(too_old());
        }
        hash = current.prev_block();
    }
    Err(too_old())
}

/// Advance the checkpoint along the best fork and prune dead branches.
///
/// A no-op until the best fork leads the checkpoint by `max_fork_age`
/// blocks. The new checkpoint is the best fork's ancestor `max_fork_age - 1`
/// blocks below its tip; every best-chain block between the old and new
/// checkpoint is height-indexed. Fork heads that no longer reach the new
/// checkpoint are deleted down to the block where they left the best chain.
///
/// # Errors
///
/// [`LightClientError::InvariantViolation`] if the best fork cannot be
/// walked back to the current checkpoint. The store is unchanged in that case.
pub fn advance<S: ChainStore + ?Sized>(
    store: &mut S,
    max_fork_age: u64,
) -> Result<FinalizeOutcome, LightClientError> {
    let (Some(tip), Some(old_checkpoint)) = (store.best_fork(), store.checkpoint()) else {
        return Ok(FinalizeOutcome::default());
    };
    let age = tip.height.saturating_sub(old_checkpoint.height);
    if max_fork_age == 0 || age < max_fork_age {
        return Ok(FinalizeOutcome::default());
    }

    // Tip first, old checkpoint last.
    let best_chain = walk_back(&*store, tip, &old_checkpoint)?;
    let new_index = (max_fork_age - 1) as usize;
    let new_checkpoint = best_chain[new_index];

    let mut outcome = FinalizeOutcome {
        checkpoint: Some(new_checkpoint),
        ..FinalizeOutcome::default()
    };
    for lb in best_chain[new_index..best_chain.len() - 1].iter().rev() {
        store.set_block_at_height(*lb);
        outcome.finalized.push(*lb);
    }
    store.set_checkpoint(new_checkpoint);

    let on_best_chain: HashSet<Hash256> = best_chain.iter().map(LightBlock::hash).collect();
    let tip_hash = tip.hash();
    for head in store.fork_head_hashes() {
        if head == tip_hash || fork_to_checkpoint(&*store, &head, max_fork_age).is_ok() {
            continue;
        }
        let mut hash = head;
        while !on_best_chain.contains(&hash) {
            match store.remove_block(&hash) {
                Some(lb) => {
                    outcome.pruned.push(hash);
                    hash = lb.prev_block();
                }
                None => break,
            }
        }
        store.set_fork_head(head, false);
        debug!(%head, "checkpoint: pruned dead fork");
    }

    info!(
        height = new_checkpoint.height,
        hash = %new_checkpoint.hash(),
        pruned = outcome.pruned.len(),
        "checkpoint: advanced"
    );
    Ok(outcome)
}

/// Blocks from `tip` back to `checkpoint`, both inclusive.
fn walk_back<S: ChainStore + ?Sized>(
    store: &S,
    tip: LightBlock,
    checkpoint: &LightBlock,
) -> Result<Vec<LightBlock>, LightClientError> {
    let checkpoint_hash = checkpoint.hash();
    let mut chain = vec![tip];
    let mut current = tip;
    while current.hash() != checkpoint_hash {
        if current.height <= checkpoint.height {
            let msg = format!("best fork {} does not descend from checkpoint {checkpoint_hash}", tip.hash());
            error!(%msg, "checkpoint: invariant violated");
            return Err(LightClientError::InvariantViolation(msg));
        }
        current = match store.light_block_by_hash(&current.prev_block()) {
            Some(parent) => parent,
            None => {
                let msg = format!("missing ancestor {} of best fork", current.prev_block());
                error!(%msg, "checkpoint: invariant violated");
                return Err(LightClientError::InvariantViolation(msg));
            }
        };
        chain.push(current);
    }
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use btclight_core::chain_store::MemoryChainStore;

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    const AGE: u64 = 4;

    /// Unvalidated header; `tag` keeps sibling hashes apart.
    fn header(prev: Hash256, tag: u32) -> BlockHeader {
        BlockHeader {
            version: 4,
            prev_block: prev,
            merkle_root: Hash256::ZERO,
            timestamp: 1_000 + tag,
            bits: 0x207fffff,
            nonce: tag,
        }
    }

    fn chain(len: u32, tag: u32) -> Vec<BlockHeader> {
        let mut out = Vec::new();
        let mut prev = Hash256::ZERO;
        for i in 0..len {
            let h = header(prev, tag + i);
            prev = h.hash();
            out.push(h);
        }
        out
    }

    /// Append `count` blocks on top of `parent`, maintaining fork heads.
    fn extend(store: &mut MemoryChainStore, parent: LightBlock, count: u32, tag: u32) -> LightBlock {
        let mut parent = parent;
        for i in 0..count {
            let was_head = store.is_fork_head(&parent.hash());
            let lb = store.add_block(&parent, header(parent.hash(), tag + i));
            if was_head {
                store.set_fork_head(parent.hash(), false);
            }
            store.set_fork_head(lb.hash(), true);
            parent = lb;
        }
        parent
    }

    fn seeded(len: u32) -> MemoryChainStore {
        let mut store = MemoryChainStore::new();
        seed(&mut store, 0, &chain(len, 0), AGE).unwrap();
        store
    }

    // ------------------------------------------------------------------
    // seed
    // ------------------------------------------------------------------

    #[test]
    fn seed_places_checkpoint_below_tip() {
        let store = seeded(10);
        let checkpoint = store.checkpoint().unwrap();
        assert_eq!(checkpoint.height, 6);
        assert_eq!(store.best_fork().unwrap().height, 9);
        assert_eq!(store.fork_head_hashes(), vec![store.best_fork().unwrap().hash()]);
        assert_eq!(store.finalized_count(), 7);
        assert!(store.light_block_at_height(7).is_none());
    }

    #[test]
    fn seed_short_run_checkpoints_first_header() {
        let store = seeded(3);
        assert_eq!(store.checkpoint().unwrap().height, 0);
        assert_eq!(store.finalized_count(), 1);
    }

    #[test]
    fn seed_accumulates_work_from_first_header() {
        let store = seeded(5);
        let tip = store.best_fork().unwrap();
        // Regtest bits carry 2 units of work each.
        assert_eq!(store.total_work(&tip.hash()), Some(U256::from(10)));
    }

    #[test]
    fn seed_rejects_bad_input() {
        let mut store = MemoryChainStore::new();
        assert_eq!(seed(&mut store, 0, &[], AGE), Err(LightClientError::EmptyBootstrap));
        assert_eq!(seed(&mut store, 0, &chain(3, 0), 0), Err(LightClientError::InvalidMaxForkAge));

        let mut broken = chain(4, 0);
        broken[2].prev_block = Hash256([7; 32]);
        assert_eq!(
            seed(&mut store, 0, &broken, AGE),
            Err(LightClientError::BootstrapNotChained { index: 2 })
        );
        assert_eq!(store.block_count(), 0);
    }

    // ------------------------------------------------------------------
    // fork_to_checkpoint
    // ------------------------------------------------------------------

    #[test]
    fn walk_from_tip_reaches_checkpoint() {
        let store = seeded(10);
        let tip = store.best_fork().unwrap();
        let fork = fork_to_checkpoint(&store, &tip.hash(), AGE).unwrap();
        let heights: Vec<u64> = fork.iter().map(|lb| lb.height).collect();
        assert_eq!(heights, vec![9, 8, 7, 6]);
    }

    #[test]
    fn walk_from_below_checkpoint_is_too_old() {
        let store = seeded(10);
        let old = store.light_block_at_height(2).unwrap();
        assert!(matches!(
            fork_to_checkpoint(&store, &old.hash(), AGE),
            Err(LightClientError::ForkTooOld(_))
        ));
    }

    #[test]
    fn walk_from_sibling_of_checkpoint_is_too_old() {
        let mut store = seeded(10);
        let below = store.light_block_at_height(5).unwrap();
        let sibling = extend(&mut store, below, 1, 500);
        assert_eq!(sibling.height, store.checkpoint().unwrap().height);
        assert!(matches!(
            fork_to_checkpoint(&store, &sibling.hash(), AGE),
            Err(LightClientError::ForkTooOld(_))
        ));
    }

    #[test]
    fn walk_exceeding_budget_is_too_old() {
        let mut store = seeded(10);
        let tip = store.best_fork().unwrap();
        let far = extend(&mut store, tip, 2, 100);
        // far is 5 above the checkpoint; only AGE + 1 = 5 blocks may be visited.
        assert!(matches!(
            fork_to_checkpoint(&store, &far.hash(), AGE),
            Err(LightClientError::ForkTooOld(_))
        ));
    }

    #[test]
    fn walk_over_missing_block_is_too_old() {
        let store = seeded(10);
        assert!(matches!(
            fork_to_checkpoint(&store, &Hash256([3; 32]), AGE),
            Err(LightClientError::ForkTooOld(_))
        ));
    }

    // ------------------------------------------------------------------
    // advance
    // ------------------------------------------------------------------

    #[test]
    fn advance_is_noop_below_age() {
        let mut store = seeded(10);
        let before = store.checkpoint();
        let outcome = advance(&mut store, AGE).unwrap();
        assert!(outcome.is_noop());
        assert_eq!(store.checkpoint(), before);
    }

    #[test]
    fn advance_moves_checkpoint_one_step() {
        let mut store = seeded(10);
        let tip = store.best_fork().unwrap();
        let new_tip = extend(&mut store, tip, 1, 100);

        let outcome = advance(&mut store, AGE).unwrap();
        let checkpoint = store.checkpoint().unwrap();
        assert_eq!(checkpoint.height, 7);
        assert_eq!(outcome.checkpoint, Some(checkpoint));
        assert_eq!(outcome.finalized, vec![checkpoint]);
        assert!(outcome.pruned.is_empty());
        assert_eq!(store.light_block_at_height(7), Some(checkpoint));
        assert_eq!(new_tip.height - checkpoint.height, AGE - 1);
    }

    #[test]
    fn advance_indexes_every_skipped_height() {
        let mut store = seeded(10);
        let tip = store.best_fork().unwrap();
        // Three blocks past the tip without finalizing in between.
        extend(&mut store, tip, 3, 100);
        let outcome = advance(&mut store, AGE).unwrap();

        assert_eq!(store.checkpoint().unwrap().height, 9);
        let heights: Vec<u64> = outcome.finalized.iter().map(|lb| lb.height).collect();
        assert_eq!(heights, vec![7, 8, 9]);
        for h in 0..=9 {
            assert!(store.light_block_at_height(h).is_some(), "height {h}");
        }
    }

    #[test]
    fn advance_prunes_forks_behind_new_checkpoint() {
        let mut store = seeded(10);
        // Side branch off height 7 (above the checkpoint at 6).
        let branch_point = fork_to_checkpoint(&store, &store.best_fork().unwrap().hash(), AGE)
            .unwrap()[2];
        assert_eq!(branch_point.height, 7);
        let side = extend(&mut store, branch_point, 2, 300);
        assert_eq!(store.fork_head_hashes().len(), 2);

        // Main chain gains two blocks: checkpoint moves to 8, past the branch point.
        let tip = store.best_fork().unwrap();
        let tip = extend(&mut store, tip, 1, 100);
        advance(&mut store, AGE).unwrap();
        assert!(store.contains_block(&side.hash()));
        let tip = extend(&mut store, tip, 1, 200);
        let outcome = advance(&mut store, AGE).unwrap();

        assert_eq!(store.checkpoint().unwrap().height, 8);
        assert_eq!(outcome.pruned.len(), 2);
        assert!(!store.contains_block(&side.hash()));
        assert!(store.contains_block(&branch_point.hash()));
        assert_eq!(store.fork_head_hashes(), vec![tip.hash()]);
    }

    #[test]
    fn advance_keeps_forks_descending_from_checkpoint() {
        let mut store = seeded(10);
        let tip = store.best_fork().unwrap();
        let tip = extend(&mut store, tip, 1, 100);
        // Sibling of the new tip, still above the next checkpoint.
        let parent = store.light_block_by_hash(&tip.prev_block()).unwrap();
        let sibling = extend(&mut store, parent, 1, 400);

        advance(&mut store, AGE).unwrap();
        assert_eq!(store.checkpoint().unwrap().height, 7);
        assert!(store.contains_block(&sibling.hash()));
        assert_eq!(store.fork_head_hashes().len(), 2);
    }

    #[test]
    fn advance_reports_broken_best_fork() {
        let mut store = seeded(10);
        let tip = store.best_fork().unwrap();
        let new_tip = extend(&mut store, tip, 1, 100);
        // Remove a block between the checkpoint and the tip.
        store.remove_block(&new_tip.prev_block());
        let before = store.checkpoint();

        assert!(matches!(
            advance(&mut store, AGE),
            Err(LightClientError::InvariantViolation(_))
        ));
        assert_eq!(store.checkpoint(), before);
    }
}
