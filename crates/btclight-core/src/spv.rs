//! SPV proof types.
//!
//! An [`SpvProof`] names a block and carries a leaf-first Merkle path for one
//! transaction. Checking it against a chain store is done by the light
//! client; this module only holds the data and the pure folding rules.

use serde::{Deserialize, Serialize};

use crate::error::MerkleError;
use crate::merkle::{PartialMerkleTree, fold_path, merkle_step};
use crate::types::{BlockHeader, Hash256};

/// Inclusion proof of `tx_id` in block `block_hash`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SpvProof {
    pub block_hash: Hash256,
    pub tx_id: Hash256,
    /// Position of the transaction in the block.
    pub tx_index: u32,
    /// `tx_id` first, then one sibling per tree level.
    pub merkle_path: Vec<Hash256>,
}

/// Outcome of checking an [`SpvProof`] against the header chain.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SpvStatus {
    /// Unknown block, or the path does not lead to its Merkle root.
    Invalid,
    /// Proof checks out but the block is above the checkpoint.
    PartialValid,
    /// Proof checks out and the block is finalized.
    Valid,
}

impl SpvProof {
    /// Build a proof from `gettxoutproof` output.
    ///
    /// The first 80 bytes are the block header; the rest is a partial Merkle
    /// tree that must reveal `txid` as one of its leaves.
    pub fn from_tx_out_proof(proof_hex: &str, txid: &Hash256) -> Result<Self, MerkleError> {
        let bytes = hex::decode(proof_hex).map_err(|e| MerkleError::InvalidHex(e.to_string()))?;
        if bytes.len() < BlockHeader::SIZE {
            return Err(MerkleError::UnexpectedEof);
        }
        let (header_bytes, tree_bytes) = bytes.split_at(BlockHeader::SIZE);
        let header = BlockHeader::from_bytes(header_bytes)?;
        let tree = PartialMerkleTree::decode(tree_bytes)?;
        let proof = tree.get_proof(txid)?;

        Ok(Self {
            block_hash: header.hash(),
            tx_id: *txid,
            tx_index: proof.leaf_index,
            merkle_path: proof.path,
        })
    }

    /// Root implied by the path, or `None` if the path does not start at `tx_id`.
    pub fn merkle_root(&self) -> Option<Hash256> {
        if self.merkle_path.first() != Some(&self.tx_id) {
            return None;
        }
        merkle_root_from_path(&self.merkle_path, self.tx_index)
    }
}

/// Fold a leaf-first path into its root.
pub fn merkle_root_from_path(path: &[Hash256], index: u32) -> Option<Hash256> {
    fold_path(path, index)
}

/// Check a flat `leaf || siblings.. || root` proof.
///
/// A lone 32-byte proof is a single-transaction block and always holds; a
/// 64-byte proof has no siblings and never does.
pub fn verify_hash256_merkle(proof: &[u8], index: u32) -> bool {
    if proof.len() % 32 != 0 {
        return false;
    }
    match proof.len() {
        32 => return true,
        64 => return false,
        _ => {}
    }

    let hashes: Vec<Hash256> = proof
        .chunks_exact(32)
        .map(|chunk| {
            let mut h = [0u8; 32];
            h.copy_from_slice(chunk);
            Hash256(h)
        })
        .collect();
    let (root, nodes) = match hashes.split_last() {
        Some(split) => split,
        None => return false,
    };

    let mut current = nodes[0];
    let mut idx = index;
    for sibling in &nodes[1..] {
        current = if idx % 2 == 1 {
            merkle_step(sibling, &current)
        } else {
            merkle_step(&current, sibling)
        };
        idx >>= 1;
    }
    current == *root
}
