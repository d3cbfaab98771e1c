//! Core chain types: hashes, block headers, light blocks.
//!
//! Hashes are stored in Bitcoin's internal byte order (the order produced by
//! SHA-256) and displayed byte-reversed, which is how explorers and
//! `bitcoind` print them.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::HeaderError;

/// A 32-byte hash value.
///
/// Used for block hashes, transaction IDs, and Merkle nodes.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes). The genesis block's previous hash.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array in internal order.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes in internal order.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Double SHA-256 of `data`.
    pub fn double_sha256(data: &[u8]) -> Self {
        let first = Sha256::digest(data);
        Self(Sha256::digest(first).into())
    }

    /// Parse a hash from internal-order hex (no byte reversal).
    pub fn from_internal_hex(s: &str) -> Result<Self, HeaderError> {
        let bytes = hex::decode(s).map_err(|e| HeaderError::InvalidHash(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| HeaderError::InvalidHash(format!("expected 64 hex chars: {s}")))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter().rev() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for Hash256 {
    type Err = HeaderError;

    /// Parse a display-order (byte-reversed) hex hash.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut hash = Self::from_internal_hex(s)?;
        hash.0.reverse();
        Ok(hash)
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Bitcoin block header.
///
/// Serialized as exactly [`BlockHeader::SIZE`] bytes: version, previous
/// block hash, Merkle root, timestamp, bits, nonce. Integers are
/// little-endian.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockHeader {
    /// Block version (signalling bits included).
    pub version: i32,
    /// Hash of the previous block header.
    pub prev_block: Hash256,
    /// Merkle root of the block's transactions.
    pub merkle_root: Hash256,
    /// Unix timestamp in seconds.
    pub timestamp: u32,
    /// Compact difficulty target.
    pub bits: u32,
    /// Proof-of-work nonce.
    pub nonce: u32,
}

impl BlockHeader {
    /// Serialized header size in bytes.
    pub const SIZE: usize = 80;

    /// Serialize into the 80-byte wire format.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(self.prev_block.as_bytes());
        out[36..68].copy_from_slice(self.merkle_root.as_bytes());
        out[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    /// Deserialize from the 80-byte wire format.
    ///
    /// # Errors
    ///
    /// [`HeaderError::InvalidHeaderSize`] unless `bytes` is exactly 80 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HeaderError> {
        if bytes.len() != Self::SIZE {
            return Err(HeaderError::InvalidHeaderSize { got: bytes.len() });
        }
        let word = |at: usize| [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]];
        let hash = |at: usize| {
            let mut h = [0u8; 32];
            h.copy_from_slice(&bytes[at..at + 32]);
            Hash256(h)
        };
        Ok(Self {
            version: i32::from_le_bytes(word(0)),
            prev_block: hash(4),
            merkle_root: hash(36),
            timestamp: u32::from_le_bytes(word(68)),
            bits: u32::from_le_bytes(word(72)),
            nonce: u32::from_le_bytes(word(76)),
        })
    }

    /// Decode a header from 160 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, HeaderError> {
        let bytes = hex::decode(s).map_err(|e| HeaderError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Hex encoding of the 80-byte wire format.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Block hash: double SHA-256 of the serialized header.
    pub fn hash(&self) -> Hash256 {
        Hash256::double_sha256(&self.to_bytes())
    }
}

/// A header together with the height assigned to it by the chain store.
///
/// Created once when the header is accepted and never mutated afterwards.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct LightBlock {
    pub height: u64,
    pub header: BlockHeader,
}

impl LightBlock {
    pub fn new(height: u64, header: BlockHeader) -> Self {
        Self { height, header }
    }

    /// Hash of the wrapped header.
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    pub fn prev_block(&self) -> Hash256 {
        self.header.prev_block
    }
}
