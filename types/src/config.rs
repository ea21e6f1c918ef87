use core::num::NonZeroU64;
use std::borrow::Cow;

use hex_literal::hex;
use nonzero_ext::nonzero;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    phase0::primitives::{Epoch, Gwei, UnixSeconds, Version, H32},
    preset::{Preset, PresetName},
};

/// Chain parameters that may differ between networks sharing a preset.
///
/// Built once and passed by reference. Missing keys in YAML fall back to mainnet values.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    // Meta
    pub config_name: Cow<'static, str>,
    pub preset_base: PresetName,

    // Genesis
    pub genesis_delay: u64,
    pub genesis_fork_version: Version,
    pub min_genesis_active_validator_count: NonZeroU64,
    pub min_genesis_time: UnixSeconds,

    // Time parameters
    pub eth1_follow_distance: u64,
    pub min_validator_withdrawability_delay: Epoch,
    pub seconds_per_eth1_block: NonZeroU64,
    pub seconds_per_slot: NonZeroU64,
    pub shard_committee_period: Epoch,

    // Validator cycle
    pub churn_limit_quotient: NonZeroU64,
    pub ejection_balance: Gwei,
    pub min_per_epoch_churn_limit: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self::mainnet()
    }
}

impl Config {
    #[must_use]
    pub fn mainnet() -> Self {
        Self {
            config_name: Cow::Borrowed("mainnet"),
            preset_base: PresetName::Mainnet,

            genesis_delay: 86400,
            genesis_fork_version: H32(hex!("00000000")),
            min_genesis_active_validator_count: nonzero!(16384_u64),
            min_genesis_time: 1_578_009_600,

            eth1_follow_distance: 1024,
            min_validator_withdrawability_delay: 256,
            seconds_per_eth1_block: nonzero!(14_u64),
            seconds_per_slot: nonzero!(12_u64),
            shard_committee_period: 256,

            churn_limit_quotient: nonzero!(65536_u64),
            ejection_balance: 16_000_000_000,
            min_per_epoch_churn_limit: 4,
        }
    }

    #[must_use]
    pub fn minimal() -> Self {
        Self {
            config_name: Cow::Borrowed("minimal"),
            preset_base: PresetName::Minimal,

            genesis_delay: 300,
            genesis_fork_version: H32(hex!("00000001")),
            min_genesis_active_validator_count: nonzero!(64_u64),

            eth1_follow_distance: 16,
            seconds_per_slot: nonzero!(6_u64),
            shard_committee_period: 64,

            churn_limit_quotient: nonzero!(32_u64),

            ..Self::mainnet()
        }
    }

    /// Checks that the configuration can be used with preset `P`.
    pub fn validate<P: Preset>(&self) -> Result<(), Error> {
        if self.preset_base != P::NAME {
            return Err(Error::PresetMismatch {
                expected: P::NAME,
                actual: self.preset_base,
            });
        }

        if self.ejection_balance >= P::MAX_EFFECTIVE_BALANCE {
            return Err(Error::EjectionBalanceTooHigh {
                ejection_balance: self.ejection_balance,
                max_effective_balance: P::MAX_EFFECTIVE_BALANCE,
            });
        }

        if self.genesis_delay == 0 {
            return Err(Error::ZeroGenesisDelay);
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration is for preset {actual} but preset {expected} is in use")]
    PresetMismatch {
        expected: PresetName,
        actual: PresetName,
    },
    #[error(
        "ejection balance {ejection_balance} is not below \
         maximum effective balance {max_effective_balance}"
    )]
    EjectionBalanceTooHigh {
        ejection_balance: Gwei,
        max_effective_balance: Gwei,
    },
    #[error("genesis delay must be nonzero")]
    ZeroGenesisDelay,
}
