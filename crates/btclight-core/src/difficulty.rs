//! Difficulty retarget schedule.
//!
//! Bitcoin retargets every [`blocks_per_retarget`](NetworkParams::blocks_per_retarget)
//! blocks by comparing the time the last window took with the expected
//! timespan. A single retarget is clamped to a factor of
//! [`retarget_adjustment_factor`](NetworkParams::retarget_adjustment_factor)
//! in either direction and never exceeds the network's pow limit.
//!
//! # Network quirks
//!
//! - **Regtest** (`no_retargeting`): every block inherits its parent's bits.
//! - **Testnet** (`reduce_min_difficulty`): a block more than
//!   `min_diff_reduction_time` after its parent may use the pow limit. Other
//!   blocks inherit the bits of the last block that did not use that rule.

use primitive_types::{U256, U512};

use crate::ancestor::AncestorView;
use crate::constants::NetworkParams;
use crate::error::ConsensusError;
use crate::work::{compact_to_target, target_to_compact};

/// Compact bits required for the child of `parent` timestamped `new_timestamp`.
///
/// # Errors
///
/// [`ConsensusError::MissingAncestor`] when a retarget needs the first
/// block of the window and it is not retained.
pub fn next_required_bits(
    params: &NetworkParams,
    parent: &AncestorView<'_>,
    new_timestamp: u32,
) -> Result<u32, ConsensusError> {
    if params.no_retargeting {
        return Ok(parent.bits());
    }

    let interval = params.blocks_per_retarget();
    if (parent.height() + 1) % interval != 0 {
        if params.reduce_min_difficulty {
            let allow_min_time = u64::from(parent.timestamp()) + params.min_diff_reduction_time;
            if u64::from(new_timestamp) > allow_min_time {
                return Ok(params.pow_limit_bits);
            }
            return Ok(last_non_min_difficulty_bits(params, parent));
        }
        return Ok(parent.bits());
    }

    // First block of the window ending at `parent`.
    let first_height = parent.height() + 1 - interval;
    let first = parent
        .ancestor(first_height)
        .ok_or(ConsensusError::MissingAncestor(first_height))?;

    let actual = i64::from(parent.timestamp()) - i64::from(first.timestamp());
    Ok(retarget_bits(params, parent.bits(), actual))
}

/// Walk back from `start` past blocks that used the minimum-difficulty rule.
///
/// Stops at a retarget boundary, a block with non-limit bits, or the oldest
/// retained ancestor. Returns the pow limit if the walk runs off the store.
fn last_non_min_difficulty_bits(params: &NetworkParams, start: &AncestorView<'_>) -> u32 {
    let interval = params.blocks_per_retarget();
    let mut node = *start;
    loop {
        if node.height() % interval == 0 || node.bits() != params.pow_limit_bits {
            return node.bits();
        }
        match node.parent() {
            Some(parent) => node = parent,
            None => return params.pow_limit_bits,
        }
    }
}

/// Scale `old_bits` by `actual_timespan / target_timespan`, clamped.
///
/// The timespan is clamped to `[timespan / factor, timespan * factor]` and
/// the result is capped at the pow limit.
pub fn retarget_bits(params: &NetworkParams, old_bits: u32, actual_timespan: i64) -> u32 {
    let timespan = params.target_timespan as i64;
    let factor = params.retarget_adjustment_factor as i64;
    let adjusted = actual_timespan.clamp(timespan / factor, timespan * factor) as u64;

    let (old_target, _, _) = compact_to_target(old_bits);
    let pow_limit = params.pow_limit();

    // 2^255 * 4 weeks does not fit in 256 bits on the easy networks.
    let scaled: U512 = old_target.full_mul(U256::from(adjusted)) / U512::from(params.target_timespan);
    let new_target = if scaled > U512::from(pow_limit) {
        pow_limit
    } else {
        U256::try_from(scaled).unwrap_or(pow_limit)
    };
    target_to_compact(new_target)
}
