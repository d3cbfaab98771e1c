//! Bitcoin Merkle trees and the partial Merkle tree proof encoding.
//!
//! Interior nodes are `double_sha256(left || right)`. Odd-width levels pair
//! the last node with itself.
//!
//! # Partial Merkle tree encoding
//!
//! `[n_transactions: u32 LE] [hash_count: varint] [hashes, depth first]
//! [flag_byte_count: varint] [flag bytes, least significant bit first]`
//!
//! Decoding replays the depth-first walk that produced the encoding. Each
//! visited node consumes one flag bit. A clear bit (or a leaf) consumes one
//! hash and stops the descent; a set bit on an interior node descends into
//! both children. Leaves whose bit is set are the matched transactions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants::MAX_PROOF_HASH_BYTES;
use crate::error::MerkleError;
use crate::types::Hash256;

/// Largest transaction count a block can hold (4M weight / 240 per tx).
pub const MAX_TRANSACTIONS: u32 = 4_000_000 / 240;

/// Hash two sibling nodes into their parent.
pub fn merkle_step(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(left.as_bytes());
    data[32..].copy_from_slice(right.as_bytes());
    Hash256::double_sha256(&data)
}

/// Compute the Merkle root of `leaves`.
///
/// Returns [`Hash256::ZERO`] for an empty slice.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return Hash256::ZERO;
    }
    let mut layer = leaves.to_vec();
    while layer.len() > 1 {
        layer = layer
            .chunks(2)
            .map(|pair| merkle_step(&pair[0], pair.get(1).unwrap_or(&pair[0])))
            .collect();
    }
    layer[0]
}

/// Fold a leaf-first path into a root.
///
/// `path[0]` is the leaf; each following entry is the sibling at the next
/// level. The leaf is on the left when its index at that level is even.
/// Returns `None` for an empty path.
pub fn fold_path(path: &[Hash256], leaf_index: u32) -> Option<Hash256> {
    let (first, siblings) = path.split_first()?;
    let mut current = *first;
    let mut index = leaf_index;
    for sibling in siblings {
        current = if index % 2 == 0 {
            merkle_step(&current, sibling)
        } else {
            merkle_step(sibling, &current)
        };
        index >>= 1;
    }
    Some(current)
}

/// Inclusion proof for one matched leaf.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MerkleProof {
    /// Root of the tree the proof was extracted from.
    pub root: Hash256,
    /// Leaf first, then one sibling per level.
    pub path: Vec<Hash256>,
    /// Position of the leaf among the block's transactions.
    pub leaf_index: u32,
}

impl MerkleProof {
    /// Recompute the root from the path and compare.
    pub fn verify(&self) -> bool {
        fold_path(&self.path, self.leaf_index) == Some(self.root)
    }
}

/// A decoded partial Merkle tree with every visited node reconstructed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartialMerkleTree {
    num_transactions: u32,
    hashes: Vec<Hash256>,
    bits: Vec<bool>,
    root: Hash256,
    /// Reconstructed node values, `nodes[height][position]`.
    nodes: Vec<HashMap<u32, Hash256>>,
    /// Matched leaves as `(position, txid)`, left to right.
    matched: Vec<(u32, Hash256)>,
}

/// Read position within the flag bits and hashes of a proof.
struct Cursor<'a> {
    bits: &'a [bool],
    hashes: &'a [Hash256],
    bit: usize,
    hash: usize,
}

impl Cursor<'_> {
    fn next_bit(&mut self) -> Result<bool, MerkleError> {
        let bit = *self.bits.get(self.bit).ok_or(MerkleError::TruncatedProof)?;
        self.bit += 1;
        Ok(bit)
    }

    fn next_hash(&mut self) -> Result<Hash256, MerkleError> {
        let hash = *self.hashes.get(self.hash).ok_or(MerkleError::TruncatedProof)?;
        self.hash += 1;
        Ok(hash)
    }
}

/// Little-endian reader over the encoded proof.
struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], MerkleError> {
        let end = self.pos.checked_add(n).ok_or(MerkleError::UnexpectedEof)?;
        let slice = self.data.get(self.pos..end).ok_or(MerkleError::UnexpectedEof)?;
        self.pos = end;
        Ok(slice)
    }

    fn u32_le(&mut self) -> Result<u32, MerkleError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Bitcoin CompactSize. Non-canonical encodings are rejected.
    fn varint(&mut self) -> Result<u64, MerkleError> {
        let prefix = self.take(1)?[0];
        let (value, min) = match prefix {
            0xfd => {
                let b = self.take(2)?;
                (u64::from(u16::from_le_bytes([b[0], b[1]])), 0xfd)
            }
            0xfe => {
                let b = self.take(4)?;
                (u64::from(u32::from_le_bytes([b[0], b[1], b[2], b[3]])), 0x1_0000)
            }
            0xff => {
                let b = self.take(8)?;
                let mut word = [0u8; 8];
                word.copy_from_slice(b);
                (u64::from_le_bytes(word), 0x1_0000_0000)
            }
            n => return Ok(u64::from(n)),
        };
        if value < min {
            return Err(MerkleError::NonCanonicalVarInt(value));
        }
        Ok(value)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

fn write_varint(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => out.push(value as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// Number of nodes at `height` in a tree over `n` leaves.
fn tree_width(n: u32, height: u32) -> u32 {
    ((u64::from(n) + (1u64 << height) - 1) >> height) as u32
}

fn tree_height(n: u32) -> u32 {
    let mut height = 0;
    while tree_width(n, height) > 1 {
        height += 1;
    }
    height
}

/// Value of node `(height, pos)` over the full leaf set.
fn node_value(leaves: &[Hash256], height: u32, pos: u32) -> Hash256 {
    if height == 0 {
        return leaves[pos as usize];
    }
    let n = leaves.len() as u32;
    let left = node_value(leaves, height - 1, pos * 2);
    let right = if pos * 2 + 1 < tree_width(n, height - 1) {
        node_value(leaves, height - 1, pos * 2 + 1)
    } else {
        left
    };
    merkle_step(&left, &right)
}

impl PartialMerkleTree {
    /// Decode the wire encoding and reconstruct the tree.
    ///
    /// # Errors
    ///
    /// - [`MerkleError::UnexpectedEof`] / [`MerkleError::TrailingData`] on framing problems
    /// - [`MerkleError::TooManyHashes`] when the hash section exceeds 64 KiB
    ///   or holds more hashes than transactions
    /// - [`MerkleError::TruncatedProof`] when the walk runs out of bits or hashes
    /// - [`MerkleError::DuplicateSiblingHash`] on identical sibling subtrees
    /// - [`MerkleError::UnusedHashes`] / [`MerkleError::UnusedBits`] when input is left over
    pub fn decode(data: &[u8]) -> Result<Self, MerkleError> {
        let mut reader = ByteReader { data, pos: 0 };
        let num_transactions = reader.u32_le()?;

        let hash_count = reader.varint()?;
        if hash_count.saturating_mul(32) > MAX_PROOF_HASH_BYTES {
            return Err(MerkleError::TooManyHashes { count: hash_count });
        }
        let hash_bytes = reader.take(hash_count as usize * 32)?;
        let hashes = hash_bytes
            .chunks_exact(32)
            .map(|chunk| {
                let mut h = [0u8; 32];
                h.copy_from_slice(chunk);
                Hash256(h)
            })
            .collect();

        let flag_count = reader.varint()?;
        if flag_count > MAX_PROOF_HASH_BYTES {
            return Err(MerkleError::TooManyFlagBytes { count: flag_count });
        }
        let flag_bytes = reader.take(flag_count as usize)?;
        let bits = flag_bytes
            .iter()
            .flat_map(|byte| (0..8).map(move |i| (byte >> i) & 1 == 1))
            .collect();

        if reader.remaining() > 0 {
            return Err(MerkleError::TrailingData(reader.remaining()));
        }

        Self::from_parts(num_transactions, hashes, bits)
    }

    /// Decode from hex.
    pub fn from_hex(s: &str) -> Result<Self, MerkleError> {
        let bytes = hex::decode(s).map_err(|e| MerkleError::InvalidHex(e.to_string()))?;
        Self::decode(&bytes)
    }

    /// Reconstruct a tree from its transaction count, hashes, and flag bits.
    pub fn from_parts(
        num_transactions: u32,
        hashes: Vec<Hash256>,
        bits: Vec<bool>,
    ) -> Result<Self, MerkleError> {
        if num_transactions == 0 {
            return Err(MerkleError::NoTransactions);
        }
        if num_transactions > MAX_TRANSACTIONS {
            return Err(MerkleError::TooManyTransactions(num_transactions));
        }
        if hashes.len() as u64 > u64::from(num_transactions) {
            return Err(MerkleError::TooManyHashes { count: hashes.len() as u64 });
        }
        if bits.len() < hashes.len() {
            return Err(MerkleError::TruncatedProof);
        }

        let height = tree_height(num_transactions);
        let mut tree = Self {
            num_transactions,
            hashes: Vec::new(),
            bits: Vec::new(),
            root: Hash256::ZERO,
            nodes: vec![HashMap::new(); height as usize + 1],
            matched: Vec::new(),
        };

        let mut cursor = Cursor { bits: &bits, hashes: &hashes, bit: 0, hash: 0 };
        let root = tree.reconstruct(&mut cursor, height, 0)?;
        let (bits_used, hashes_used) = (cursor.bit, cursor.hash);

        // Padding in the last flag byte is the only slack allowed.
        if bits_used.div_ceil(8) != bits.len().div_ceil(8) {
            return Err(MerkleError::UnusedBits);
        }
        if hashes_used != hashes.len() {
            return Err(MerkleError::UnusedHashes(hashes.len() - hashes_used));
        }

        let mut bits = bits;
        bits.truncate(bits_used);
        tree.root = root;
        tree.hashes = hashes;
        tree.bits = bits;
        Ok(tree)
    }

    fn reconstruct(
        &mut self,
        cursor: &mut Cursor<'_>,
        height: u32,
        pos: u32,
    ) -> Result<Hash256, MerkleError> {
        let parent_of_match = cursor.next_bit()?;
        let value = if height == 0 || !parent_of_match {
            let hash = cursor.next_hash()?;
            if height == 0 && parent_of_match {
                self.matched.push((pos, hash));
            }
            hash
        } else {
            let left = self.reconstruct(cursor, height - 1, pos * 2)?;
            let right = if pos * 2 + 1 < tree_width(self.num_transactions, height - 1) {
                let right = self.reconstruct(cursor, height - 1, pos * 2 + 1)?;
                if right == left {
                    return Err(MerkleError::DuplicateSiblingHash(left.to_string()));
                }
                right
            } else {
                left
            };
            merkle_step(&left, &right)
        };
        self.nodes[height as usize].insert(pos, value);
        Ok(value)
    }

    /// Build the proof encoding for `leaves`, revealing those with `matches[i]` set.
    ///
    /// # Errors
    ///
    /// [`MerkleError::NoTransactions`] for an empty leaf set. Fails like
    /// [`from_parts`](Self::from_parts) if the tree cannot be reconstructed,
    /// e.g. identical adjacent leaves.
    pub fn build(leaves: &[Hash256], matches: &[bool]) -> Result<Self, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::NoTransactions);
        }
        let n = u32::try_from(leaves.len()).map_err(|_| MerkleError::TooManyTransactions(u32::MAX))?;
        let mut hashes = Vec::new();
        let mut bits = Vec::new();
        Self::traverse_and_build(leaves, matches, tree_height(n), 0, &mut hashes, &mut bits);
        Self::from_parts(n, hashes, bits)
    }

    fn traverse_and_build(
        leaves: &[Hash256],
        matches: &[bool],
        height: u32,
        pos: u32,
        hashes: &mut Vec<Hash256>,
        bits: &mut Vec<bool>,
    ) {
        let n = leaves.len() as u32;
        let start = (pos as u64) << height;
        let end = (((pos as u64) + 1) << height).min(u64::from(n));
        let parent_of_match = (start..end).any(|i| matches.get(i as usize).copied().unwrap_or(false));
        bits.push(parent_of_match);

        if height == 0 || !parent_of_match {
            hashes.push(node_value(leaves, height, pos));
        } else {
            Self::traverse_and_build(leaves, matches, height - 1, pos * 2, hashes, bits);
            if pos * 2 + 1 < tree_width(n, height - 1) {
                Self::traverse_and_build(leaves, matches, height - 1, pos * 2 + 1, hashes, bits);
            }
        }
    }

    /// Serialize into the wire encoding.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + 9 + self.hashes.len() * 32 + 9 + self.bits.len() / 8 + 1);
        out.extend_from_slice(&self.num_transactions.to_le_bytes());
        write_varint(&mut out, self.hashes.len() as u64);
        for hash in &self.hashes {
            out.extend_from_slice(hash.as_bytes());
        }
        let mut flags = vec![0u8; self.bits.len().div_ceil(8)];
        for (i, bit) in self.bits.iter().enumerate() {
            if *bit {
                flags[i / 8] |= 1 << (i % 8);
            }
        }
        write_varint(&mut out, flags.len() as u64);
        out.extend_from_slice(&flags);
        out
    }

    pub fn num_transactions(&self) -> u32 {
        self.num_transactions
    }

    /// Hashes carried by the encoding, in depth-first order.
    pub fn hashes(&self) -> &[Hash256] {
        &self.hashes
    }

    /// Height of the root above the leaves.
    pub fn height(&self) -> u32 {
        (self.nodes.len() - 1) as u32
    }

    /// Reconstructed Merkle root.
    pub fn root(&self) -> Hash256 {
        self.root
    }

    /// Matched leaves as `(position, txid)`.
    pub fn matched_leaves(&self) -> &[(u32, Hash256)] {
        &self.matched
    }

    /// Inclusion proof for any leaf the tree reveals, matched or not.
    ///
    /// A txid revealed at several positions resolves to the lowest one.
    ///
    /// # Errors
    ///
    /// [`MerkleError::NotInMerkleTree`] if `txid` is not a reconstructed
    /// leaf. Interior hashes never qualify.
    pub fn get_proof(&self, txid: &Hash256) -> Result<MerkleProof, MerkleError> {
        let leaf_index = self
            .nodes
            .first()
            .and_then(|leaves| leaves.iter().filter(|(_, h)| *h == txid).map(|(p, _)| *p).min())
            .ok_or_else(|| MerkleError::NotInMerkleTree(txid.to_string()))?;

        let mut path = vec![*txid];
        let mut pos = leaf_index;
        for height in 0..self.height() {
            let level = &self.nodes[height as usize];
            let sibling_pos = pos ^ 1;
            let sibling = if sibling_pos < tree_width(self.num_transactions, height) {
                level.get(&sibling_pos).copied().ok_or(MerkleError::TruncatedProof)?
            } else {
                level.get(&pos).copied().ok_or(MerkleError::TruncatedProof)?
            };
            path.push(sibling);
            pos >>= 1;
        }

        Ok(MerkleProof { root: self.root, path, leaf_index })
    }
}
