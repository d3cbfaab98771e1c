//! Adversarial property-based tests for the btclight light client.
//!
//! These tests feed the header chain and the proof decoders randomized
//! inputs and check that the store invariants survive.
//!
//! Attack vectors tested:
//! - Replaying stored headers
//! - Forking from below the checkpoint
//! - Random fork trees against checkpoint monotonicity and pruning
//! - Cumulative work accounting on every branch
//! - Malformed partial Merkle trees and flat Merkle proofs

use proptest::prelude::*;

use btclight_consensus::{ChangeSet, LightClient};
use btclight_core::chain_store::MemoryChainStore;
use btclight_core::error::LightClientError;
use btclight_core::merkle::{PartialMerkleTree, merkle_root};
use btclight_core::spv::verify_hash256_merkle;
use btclight_core::types::{BlockHeader, Hash256, LightBlock};
use btclight_core::work::work_from_bits;
use btclight_tests::helpers::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Whether `from` walks back to the checkpoint through retained blocks.
fn reaches_checkpoint(lc: &LightClient<MemoryChainStore>, from: &LightBlock) -> bool {
    let Some(cp) = lc.checkpoint() else {
        return false;
    };
    let mut current = *from;
    while current.height > cp.height {
        match lc.block_by_hash(&current.prev_block()) {
            Some(parent) => current = parent,
            None => return false,
        }
    }
    current.hash() == cp.hash()
}

/// Distinct leaf hashes.
fn leaves(n: usize) -> Vec<Hash256> {
    (0..n as u32).map(|i| Hash256::double_sha256(&i.to_le_bytes())).collect()
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Re-submitting a stored header never changes the store.
    #[test]
    fn replayed_header_is_rejected(index in 0usize..18) {
        let mut lc = regtest_client();
        let before = lc.store().snapshot();

        let err = lc.insert_header(header(REGTEST_HEADERS[index])).unwrap_err();
        prop_assert!(matches!(err, LightClientError::DuplicateBlock(_)));
        prop_assert_eq!(lc.store().snapshot(), before);
    }

    /// A branch starting below the checkpoint is rejected as too old,
    /// however short it is.
    #[test]
    fn fork_below_checkpoint_rejected(parent_height in 0usize..10, tag in any::<u8>()) {
        let mut lc = regtest_client();
        let parent = header(REGTEST_HEADERS[parent_height]);
        let fork = child(&parent, Hash256([tag; 32]));

        let err = lc.insert_header(fork).unwrap_err();
        prop_assert!(matches!(err, LightClientError::ForkTooOld(_)), "got {:?}", err);
        prop_assert!(!lc.contains_block(&fork.hash()));
    }
}

// ---------------------------------------------------------------------------
// Random fork trees
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Grow a random tree of forks over the fixture chain, finalizing after
    /// every insert.
    ///
    /// Each step picks a parent among all blocks seen so far, including ones
    /// that may since have been pruned or fallen below the checkpoint.
    #[test]
    fn random_forks_keep_store_consistent(
        parents in prop::collection::vec(any::<prop::sample::Index>(), 1..24),
        age in 2u64..6,
    ) {
        let mut lc = regtest_client_with_age(age);
        let mut seen: Vec<BlockHeader> = headers(&REGTEST_HEADERS);
        let mut last_cp = lc.checkpoint().unwrap();

        for (step, pick) in parents.iter().enumerate() {
            let parent = *pick.get(&seen);
            let mut root = [0u8; 32];
            root[..8].copy_from_slice(&(step as u64).to_le_bytes());
            let next = child(&parent, Hash256(root));

            let mut changes = ChangeSet::default();
            match lc.insert_and_finalize(&[next], &mut changes) {
                Ok(()) => {
                    seen.push(next);
                    prop_assert_eq!(changes.inserted.len(), 1);
                    // Either end may already be pruned by the finalize pass.
                    let works = (lc.total_work(&parent.hash()), lc.total_work(&next.hash()));
                    if let (Some(parent_work), Some(work)) = works {
                        prop_assert_eq!(work, parent_work + work_from_bits(next.bits));
                    }
                }
                Err(LightClientError::BatchRejected { source, .. }) => {
                    prop_assert!(
                        matches!(*source, LightClientError::ForkTooOld(_)
                            | LightClientError::ParentBlockNotInChain(_)),
                        "unexpected rejection {:?}", source
                    );
                    prop_assert!(changes.is_empty());
                }
                Err(other) => return Err(TestCaseError::fail(format!("store corrupted: {other:?}"))),
            }

            let cp = lc.checkpoint().unwrap();
            prop_assert!(cp.height >= last_cp.height);
            if cp.height > last_cp.height {
                // The old checkpoint stays on the finalized chain.
                prop_assert_eq!(lc.block_at_height(last_cp.height), Some(last_cp));
            }
            last_cp = cp;

            let best = lc.best_fork().unwrap();
            prop_assert!(best.height >= cp.height);
            prop_assert!(best.height - cp.height < age);
            for head in lc.fork_heads() {
                prop_assert!(reaches_checkpoint(&lc, &head), "dangling fork head {}", head.hash());
                prop_assert!(lc.total_work(&head.hash()).unwrap() <= lc.total_work(&best.hash()).unwrap());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Partial Merkle trees
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Built trees commit to the full leaf set and prove every matched leaf.
    #[test]
    fn built_tree_proves_matches(
        n in 1usize..200,
        mask in prop::collection::vec(any::<bool>(), 200),
    ) {
        let leaves = leaves(n);
        let matches = &mask[..n];
        let tree = PartialMerkleTree::build(&leaves, matches).unwrap();
        prop_assert_eq!(tree.root(), merkle_root(&leaves));

        let decoded = PartialMerkleTree::decode(&tree.encode()).unwrap();
        prop_assert_eq!(&decoded, &tree);

        let expected: Vec<(u32, Hash256)> = matches
            .iter()
            .enumerate()
            .filter(|(_, m)| **m)
            .map(|(i, _)| (i as u32, leaves[i]))
            .collect();
        prop_assert_eq!(tree.matched_leaves(), expected.as_slice());

        for (index, txid) in expected {
            let proof = tree.get_proof(&txid).unwrap();
            prop_assert_eq!(proof.leaf_index, index);
            prop_assert!(proof.verify());
        }
    }

    /// Arbitrary bytes either decode or fail cleanly.
    #[test]
    fn random_bytes_never_panic(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = PartialMerkleTree::decode(&data);
    }

    /// A flipped bit in any carried hash changes the root or the matched
    /// leaves.
    #[test]
    fn corrupted_hash_detected(
        n in 2usize..64,
        matched in any::<prop::sample::Index>(),
        flip in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let leaves = leaves(n);
        let mut matches = vec![false; n];
        matches[matched.index(n)] = true;
        let tree = PartialMerkleTree::build(&leaves, &matches).unwrap();

        // Transaction count, then a one-byte hash count.
        let hash_section = 5..5 + tree.hashes().len() * 32;
        let mut bytes = tree.encode();
        let at = hash_section.start + flip.index(hash_section.len());
        bytes[at] ^= 1 << bit;

        let tampered = PartialMerkleTree::decode(&bytes).unwrap();
        prop_assert!(
            tampered.root() != tree.root() || tampered.matched_leaves() != tree.matched_leaves(),
            "bit flip at byte {} went unnoticed", at
        );
    }

    /// Flat proofs of any shape never panic, and a correct one stops
    /// verifying once a sibling is altered.
    #[test]
    fn flat_proof_tampering(
        data in prop::collection::vec(any::<u8>(), 0..320),
        index in any::<u32>(),
        n in 3usize..64,
        target in any::<prop::sample::Index>(),
    ) {
        let _ = verify_hash256_merkle(&data, index);

        let leaves = leaves(n);
        let leaf = target.index(n);
        let mut matches = vec![false; n];
        matches[leaf] = true;
        let tree = PartialMerkleTree::build(&leaves, &matches).unwrap();
        let proof = tree.get_proof(&leaves[leaf]).unwrap();

        let mut flat: Vec<u8> = proof.path.iter().flat_map(|h| h.0).collect();
        flat.extend_from_slice(tree.root().as_bytes());
        prop_assert!(verify_hash256_merkle(&flat, leaf as u32));

        flat[32] ^= 0x01;
        prop_assert!(!verify_hash256_merkle(&flat, leaf as u32));
    }
}
