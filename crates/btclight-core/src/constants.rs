//! Protocol constants and per-network consensus parameters.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BootstrapError;
use crate::work::compact_to_target;

/// Default finalization depth.
///
/// A fork must lead the checkpoint by this many blocks before the
/// checkpoint advances. Engines take the value as a parameter.
pub const MAX_FORK_AGE_DEFAULT: u64 = 8;

/// Number of ancestor timestamps used for median-time-past.
pub const MEDIAN_TIME_BLOCKS: usize = 11;

/// How far past the local clock a header timestamp may be, in seconds.
pub const MAX_FUTURE_BLOCK_TIME: u64 = 2 * 60 * 60;

/// Upper bound on the hash section of a partial Merkle tree, in bytes.
pub const MAX_PROOF_HASH_BYTES: u64 = 65_536;

/// Default JSON-RPC port.
pub const DEFAULT_RPC_PORT: u16 = 9797;

/// Bitcoin network selector.
///
/// Names match the `network` field of bootstrap files.
///
/// # Examples
///
/// ```
/// use btclight_core::constants::Network;
/// let net: Network = "regressionnet".parse().unwrap();
/// assert_eq!(net, Network::Regressionnet);
/// assert_eq!(net.params().pow_limit_bits, 0x207fffff);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production network.
    #[default]
    Mainnet,
    /// Public test network (version 3).
    Testnet3,
    /// Private simulation network.
    Simnet,
    /// Signed-block test network.
    Signet,
    /// Local regression-test network, no retargeting.
    Regressionnet,
}

impl Network {
    pub const ALL: [Network; 5] = [
        Self::Mainnet,
        Self::Testnet3,
        Self::Simnet,
        Self::Signet,
        Self::Regressionnet,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet3 => "testnet3",
            Self::Simnet => "simnet",
            Self::Signet => "signet",
            Self::Regressionnet => "regressionnet",
        }
    }

    /// Consensus parameters for this network.
    pub fn params(&self) -> NetworkParams {
        match self {
            Self::Mainnet => NetworkParams {
                network: *self,
                pow_limit_bits: 0x1d00ffff,
                reduce_min_difficulty: false,
                no_retargeting: false,
                bip34_height: 227_931,
                bip65_height: 388_381,
                bip66_height: 363_725,
                ..NetworkParams::BITCOIN_TIMING
            },
            Self::Testnet3 => NetworkParams {
                network: *self,
                pow_limit_bits: 0x1d00ffff,
                reduce_min_difficulty: true,
                no_retargeting: false,
                bip34_height: 21_111,
                bip65_height: 581_885,
                bip66_height: 330_776,
                ..NetworkParams::BITCOIN_TIMING
            },
            Self::Simnet => NetworkParams {
                network: *self,
                pow_limit_bits: 0x207fffff,
                reduce_min_difficulty: true,
                no_retargeting: false,
                bip34_height: 0,
                bip65_height: 0,
                bip66_height: 0,
                ..NetworkParams::BITCOIN_TIMING
            },
            Self::Signet => NetworkParams {
                network: *self,
                pow_limit_bits: 0x1e0377ae,
                reduce_min_difficulty: false,
                no_retargeting: false,
                bip34_height: 1,
                bip65_height: 1,
                bip66_height: 1,
                ..NetworkParams::BITCOIN_TIMING
            },
            Self::Regressionnet => NetworkParams {
                network: *self,
                pow_limit_bits: 0x207fffff,
                reduce_min_difficulty: true,
                no_retargeting: true,
                bip34_height: 100_000_000,
                bip65_height: 1_351,
                bip66_height: 1_251,
                ..NetworkParams::BITCOIN_TIMING
            },
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Network {
    type Err = BootstrapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|n| n.name() == s)
            .ok_or_else(|| BootstrapError::UnknownNetwork(s.to_string()))
    }
}

/// Consensus parameters the header validator needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkParams {
    pub network: Network,
    /// Compact encoding of the easiest allowed target.
    pub pow_limit_bits: u32,
    /// Expected duration of one retarget window, in seconds.
    pub target_timespan: u64,
    /// Expected spacing between blocks, in seconds.
    pub target_spacing: u64,
    /// Bound on how far a single retarget may move the target.
    pub retarget_adjustment_factor: u64,
    /// Testnet rule: a block may use the pow limit after a long gap.
    pub reduce_min_difficulty: bool,
    /// Gap after which the minimum difficulty rule applies.
    pub min_diff_reduction_time: u64,
    /// Regtest rule: difficulty never changes.
    pub no_retargeting: bool,
    pub bip34_height: u64,
    pub bip65_height: u64,
    pub bip66_height: u64,
}

impl NetworkParams {
    /// Timing shared by every Bitcoin network.
    const BITCOIN_TIMING: NetworkParams = NetworkParams {
        network: Network::Mainnet,
        pow_limit_bits: 0x1d00ffff,
        target_timespan: 14 * 24 * 60 * 60,
        target_spacing: 10 * 60,
        retarget_adjustment_factor: 4,
        reduce_min_difficulty: false,
        min_diff_reduction_time: 2 * 10 * 60,
        no_retargeting: false,
        bip34_height: 0,
        bip65_height: 0,
        bip66_height: 0,
    };

    /// Blocks between difficulty retargets (2016 on every network).
    pub fn blocks_per_retarget(&self) -> u64 {
        self.target_timespan / self.target_spacing
    }

    /// The easiest allowed target as a 256-bit integer.
    pub fn pow_limit(&self) -> U256 {
        compact_to_target(self.pow_limit_bits).0
    }

    /// Minimum header version required at `height`.
    pub fn min_version(&self, height: u64) -> i32 {
        if height >= self.bip65_height {
            4
        } else if height >= self.bip66_height {
            3
        } else if height >= self.bip34_height {
            2
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_names_roundtrip() {
        for net in Network::ALL {
            assert_eq!(net.name().parse::<Network>().unwrap(), net);
            assert_eq!(net.to_string(), net.name());
        }
    }

    #[test]
    fn unknown_network_rejected() {
        assert_eq!(
            "testnet4".parse::<Network>(),
            Err(BootstrapError::UnknownNetwork("testnet4".into()))
        );
    }

    #[test]
    fn network_serde_uses_names() {
        let json = serde_json::to_string(&Network::Testnet3).unwrap();
        assert_eq!(json, "\"testnet3\"");
        let net: Network = serde_json::from_str("\"regressionnet\"").unwrap();
        assert_eq!(net, Network::Regressionnet);
    }

    #[test]
    fn retarget_interval_is_2016() {
        for net in Network::ALL {
            assert_eq!(net.params().blocks_per_retarget(), 2016);
        }
    }

    #[test]
    fn regtest_never_retargets() {
        let p = Network::Regressionnet.params();
        assert!(p.no_retargeting);
        assert!(p.reduce_min_difficulty);
        assert_eq!(p.network, Network::Regressionnet);
    }

    #[test]
    fn mainnet_pow_limit() {
        let limit = Network::Mainnet.params().pow_limit();
        assert_eq!(limit, U256::from(0xffffu64) << 208);
    }

    #[test]
    fn min_version_by_height() {
        let p = Network::Mainnet.params();
        assert_eq!(p.min_version(0), 1);
        assert_eq!(p.min_version(227_931), 2);
        assert_eq!(p.min_version(363_725), 3);
        assert_eq!(p.min_version(388_381), 4);

        // Regtest activates BIP66 and BIP65 long before BIP34.
        let r = Network::Regressionnet.params();
        assert_eq!(r.min_version(100), 1);
        assert_eq!(r.min_version(1_251), 3);
        assert_eq!(r.min_version(1_351), 4);
    }
}
