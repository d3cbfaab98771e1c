//! Contextual header validation.
//!
//! A header is checked against its own proof of work and against the
//! ancestors reachable through an [`AncestorView`] of its parent:
//!
//! 1. Bits encode a positive target within the pow limit, and the hash meets it.
//! 2. Bits match the retarget schedule ([`difficulty::next_required_bits`]).
//! 3. Timestamp is after the median of the last [`MEDIAN_TIME_BLOCKS`] ancestors.
//! 4. Timestamp is at most [`MAX_FUTURE_BLOCK_TIME`] ahead of the local clock.
//! 5. Version meets the BIP34/66/65 minimum for the header's height.
//!
//! Linkage (`prev_block` naming the parent) is the caller's job.

use crate::ancestor::AncestorView;
use crate::constants::{MAX_FUTURE_BLOCK_TIME, MEDIAN_TIME_BLOCKS, NetworkParams};
use crate::difficulty;
use crate::error::ConsensusError;
use crate::types::BlockHeader;
use crate::work::{compact_to_target, hash_meets_target};

/// Context required to validate a header.
#[derive(Clone, Copy)]
pub struct HeaderContext<'a> {
    /// The block the header claims as its parent.
    pub parent: AncestorView<'a>,
    /// Current wall-clock time in Unix seconds.
    pub current_time: u64,
}

/// Check that `header` carries valid bits and its hash meets them.
pub fn check_pow(params: &NetworkParams, header: &BlockHeader) -> Result<(), ConsensusError> {
    let (target, negative, overflow) = compact_to_target(header.bits);
    if negative || overflow || target.is_zero() || target > params.pow_limit() {
        return Err(ConsensusError::BadDifficultyBits(header.bits));
    }
    let hash = header.hash();
    if !hash_meets_target(&hash, target) {
        return Err(ConsensusError::HighHash(hash.to_string()));
    }
    Ok(())
}

/// Median timestamp of `view` and up to ten of its ancestors.
///
/// Uses however many blocks are retained when fewer than eleven are.
pub fn median_time_past(view: &AncestorView<'_>) -> u32 {
    let mut timestamps = Vec::with_capacity(MEDIAN_TIME_BLOCKS);
    let mut node = Some(*view);
    while let Some(current) = node {
        if timestamps.len() == MEDIAN_TIME_BLOCKS {
            break;
        }
        timestamps.push(current.timestamp());
        node = current.parent();
    }
    timestamps.sort_unstable();
    timestamps[timestamps.len() / 2]
}

/// Validate `header` as the child of `ctx.parent`.
pub fn validate_header(
    params: &NetworkParams,
    header: &BlockHeader,
    ctx: &HeaderContext<'_>,
) -> Result<(), ConsensusError> {
    check_pow(params, header)?;

    let expected = difficulty::next_required_bits(params, &ctx.parent, header.timestamp)?;
    if header.bits != expected {
        return Err(ConsensusError::UnexpectedDifficulty { got: header.bits, expected });
    }

    let median = median_time_past(&ctx.parent);
    if header.timestamp <= median {
        return Err(ConsensusError::TimeTooOld { timestamp: header.timestamp, median });
    }

    let max = ctx.current_time.saturating_add(MAX_FUTURE_BLOCK_TIME);
    if u64::from(header.timestamp) > max {
        return Err(ConsensusError::TimeTooNew { timestamp: header.timestamp, max });
    }

    let height = ctx.parent.height() + 1;
    if header.version < params.min_version(height) {
        return Err(ConsensusError::ObsoleteVersion { version: header.version, height });
    }
    Ok(())
}
