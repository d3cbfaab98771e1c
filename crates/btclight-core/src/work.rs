//! Compact difficulty targets and chain work.
//!
//! Bitcoin encodes a 256-bit target in 32 bits: one size byte and a 23-bit
//! mantissa with a sign bit. [`compact_to_target`] and [`target_to_compact`]
//! mirror Bitcoin Core's `SetCompact` / `GetCompact`.
//!
//! The work of a block is the expected number of hashes needed to find a
//! hash at or below its target, `2^256 / (target + 1)`. Forks are compared
//! by the sum of their blocks' work.

use primitive_types::U256;

use crate::types::Hash256;

/// Decode compact `bits` into `(target, negative, overflow)`.
///
/// The target is zero when either flag is set.
pub fn compact_to_target(bits: u32) -> (U256, bool, bool) {
    let size = bits >> 24;
    let mut word = bits & 0x007f_ffff;

    let negative = word != 0 && (bits & 0x0080_0000) != 0;
    let overflow = word != 0
        && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));
    if negative || overflow {
        return (U256::zero(), negative, overflow);
    }

    let target = if size <= 3 {
        word >>= 8 * (3 - size);
        U256::from(word)
    } else {
        U256::from(word) << (8 * (size - 3) as usize)
    };
    (target, false, false)
}

/// Encode a target into compact form.
pub fn target_to_compact(target: U256) -> u32 {
    let mut size = target.bits().div_ceil(8) as u32;
    let mut compact = if size <= 3 {
        (target.low_u64() << (8 * (3 - size))) as u32
    } else {
        (target >> (8 * (size - 3) as usize)).low_u64() as u32
    };

    // The mantissa's top bit is the sign; shift it out of the way.
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }
    compact | (size << 24)
}

/// Work represented by a single block with difficulty `bits`.
///
/// Zero when the bits do not encode a positive target.
pub fn work_from_bits(bits: u32) -> U256 {
    let (target, negative, overflow) = compact_to_target(bits);
    if negative || overflow || target.is_zero() {
        return U256::zero();
    }
    match target.checked_add(U256::one()) {
        // 2^256 / (target + 1) computed without a 257-bit intermediate.
        Some(denominator) => (!target / denominator) + U256::one(),
        None => U256::one(),
    }
}

/// Interpret a block hash as a little-endian 256-bit integer.
pub fn hash_to_u256(hash: &Hash256) -> U256 {
    U256::from_little_endian(hash.as_bytes())
}

/// Whether `hash` satisfies `target`.
pub fn hash_meets_target(hash: &Hash256, target: U256) -> bool {
    hash_to_u256(hash) <= target
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- compact_to_target ---

    #[test]
    fn decodes_mainnet_pow_limit() {
        let (target, neg, ovf) = compact_to_target(0x1d00ffff);
        assert!(!neg && !ovf);
        assert_eq!(target, U256::from(0xffffu64) << 208);
    }

    #[test]
    fn decodes_small_sizes() {
        assert_eq!(compact_to_target(0x01003456).0, U256::zero());
        assert_eq!(compact_to_target(0x01123456).0, U256::from(0x12));
        assert_eq!(compact_to_target(0x02123456).0, U256::from(0x1234));
        assert_eq!(compact_to_target(0x03123456).0, U256::from(0x123456));
        assert_eq!(compact_to_target(0x04123456).0, U256::from(0x12345600u64));
    }

    #[test]
    fn detects_negative_and_overflow() {
        let (_, neg, ovf) = compact_to_target(0x04923456);
        assert!(neg);
        assert!(!ovf);

        let (target, neg, ovf) = compact_to_target(0xff123456);
        assert!(!neg);
        assert!(ovf);
        assert!(target.is_zero());

        // Zero mantissa is never negative or overflowing.
        let (target, neg, ovf) = compact_to_target(0x00800000);
        assert!(!neg && !ovf && target.is_zero());
    }

    // --- target_to_compact ---

    #[test]
    fn encodes_back_to_canonical_bits() {
        for bits in [0x1d00ffffu32, 0x207fffff, 0x170362d3, 0x1a0575ef, 0x03123456] {
            let (target, _, _) = compact_to_target(bits);
            assert_eq!(target_to_compact(target), bits, "bits {bits:#x}");
        }
    }

    #[test]
    fn encode_moves_sign_bit_into_size() {
        // 0x80 would set the sign bit in a 1-byte mantissa.
        assert_eq!(target_to_compact(U256::from(0x80)), 0x02008000);
        assert_eq!(target_to_compact(U256::zero()), 0);
    }

    // --- work ---

    #[test]
    fn regtest_block_work_is_two() {
        assert_eq!(work_from_bits(0x207fffff), U256::from(2));
    }

    #[test]
    fn mainnet_genesis_work() {
        // 2^256 / (0xffff * 2^208 + 1) = 0x100010001.
        assert_eq!(work_from_bits(0x1d00ffff), U256::from(0x1_0001_0001u64));
    }

    #[test]
    fn invalid_bits_have_no_work() {
        assert!(work_from_bits(0).is_zero());
        assert!(work_from_bits(0x04923456).is_zero());
        assert!(work_from_bits(0xff123456).is_zero());
    }

    #[test]
    fn harder_target_means_more_work() {
        assert!(work_from_bits(0x170362d3) > work_from_bits(0x1d00ffff));
    }

    // --- hash vs target ---

    #[test]
    fn hash_comparison_is_little_endian() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xff;
        let low = Hash256(bytes);
        assert_eq!(hash_to_u256(&low), U256::from(0xff));
        assert!(hash_meets_target(&low, U256::from(0xff)));
        assert!(!hash_meets_target(&low, U256::from(0xfe)));
    }
}
