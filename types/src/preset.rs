use core::{fmt::Debug, hash::Hash, num::NonZeroU64};

use derive_more::Display;
use nonzero_ext::nonzero;
use serde::{Deserialize, Serialize};
use typenum::{
    NonZero, Prod, Unsigned, U1099511627776, U128, U16, U16777216, U2, U2048, U256, U32, U4,
    U64, U65536, U8, U8192,
};

use crate::{config::Config, phase0::primitives::Gwei};

/// Compile-time protocol constants.
///
/// One implementor is one protocol instance. Capacities of collections are type-level so that
/// containers carry their limits in their types.
///
/// Values are those of [v0.12.1](https://github.com/ethereum/consensus-specs/tree/v0.12.1/configs).
pub trait Preset: Copy + Eq + Ord + Hash + Default + Debug + Send + Sync + 'static {
    type EpochsPerEth1VotingPeriod: Unsigned + NonZero;
    type EpochsPerHistoricalRoot: Unsigned + NonZero;
    type EpochsPerHistoricalVector: Unsigned + NonZero + Debug + Send + Sync;
    type EpochsPerSlashingsVector: Unsigned + NonZero + Debug + Send + Sync;
    type HistoricalRootsLimit: Unsigned + Debug + Send + Sync;
    type MaxAttestations: Unsigned + Eq + Debug + Send + Sync;
    type MaxAttesterSlashings: Unsigned + Eq + Debug + Send + Sync;
    type MaxDeposits: Unsigned + Eq + Debug + Send + Sync;
    type MaxProposerSlashings: Unsigned + Eq + Debug + Send + Sync;
    type MaxValidatorsPerCommittee: Unsigned + NonZero + Eq + Debug + Send + Sync;
    type MaxVoluntaryExits: Unsigned + Eq + Debug + Send + Sync;
    type SlotsPerEpoch: Unsigned + NonZero;
    type ValidatorRegistryLimit: Unsigned + NonZero + Debug + Send + Sync;

    // Derived type-level variables
    type MaxAttestationsPerEpoch: Unsigned + Debug + Send + Sync;
    type SlotsPerEth1VotingPeriod: Unsigned + NonZero + Debug + Send + Sync;
    type SlotsPerHistoricalRoot: Unsigned + NonZero + Eq + Debug + Send + Sync;

    const NAME: PresetName;

    const BASE_REWARD_FACTOR: u64 = 64;
    const EFFECTIVE_BALANCE_INCREMENT: NonZeroU64 = nonzero!(1_000_000_000_u64);
    const HYSTERESIS_DOWNWARD_MULTIPLIER: u64 = 1;
    const HYSTERESIS_QUOTIENT: NonZeroU64 = nonzero!(4_u64);
    const HYSTERESIS_UPWARD_MULTIPLIER: u64 = 5;
    const INACTIVITY_PENALTY_QUOTIENT: NonZeroU64 = nonzero!(1_u64 << 24);
    const MAX_COMMITTEES_PER_SLOT: NonZeroU64 = nonzero!(64_u64);
    const MAX_EFFECTIVE_BALANCE: Gwei = 32_000_000_000;
    const MAX_SEED_LOOKAHEAD: u64 = 4;
    const MIN_ATTESTATION_INCLUSION_DELAY: NonZeroU64 = NonZeroU64::MIN;
    const MIN_DEPOSIT_AMOUNT: Gwei = 1_000_000_000;
    const MIN_EPOCHS_TO_INACTIVITY_PENALTY: u64 = 4;
    const MIN_SEED_LOOKAHEAD: u64 = 1;
    const MIN_SLASHING_PENALTY_QUOTIENT: NonZeroU64 = nonzero!(32_u64);
    const PROPORTIONAL_SLASHING_MULTIPLIER: u64 = 3;
    const PROPOSER_REWARD_QUOTIENT: NonZeroU64 = nonzero!(8_u64);
    const SAFE_SLOTS_TO_UPDATE_JUSTIFIED: u64 = 8;
    const SHUFFLE_ROUND_COUNT: u8 = 90;
    const TARGET_COMMITTEE_SIZE: NonZeroU64 = nonzero!(128_u64);
    const WHISTLEBLOWER_REWARD_QUOTIENT: NonZeroU64 = nonzero!(512_u64);

    /// Returns the configuration usually paired with this preset.
    ///
    /// Only meant for tests and tools. Real deployments load a `Config`.
    #[must_use]
    fn default_config() -> Config {
        Self::NAME.default_config()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Mainnet;

impl Preset for Mainnet {
    type EpochsPerEth1VotingPeriod = U32;
    type EpochsPerHistoricalRoot = U256;
    type EpochsPerHistoricalVector = U65536;
    type EpochsPerSlashingsVector = U8192;
    type HistoricalRootsLimit = U16777216;
    type MaxAttestations = U128;
    type MaxAttesterSlashings = U2;
    type MaxDeposits = U16;
    type MaxProposerSlashings = U16;
    type MaxValidatorsPerCommittee = U2048;
    type MaxVoluntaryExits = U16;
    type SlotsPerEpoch = U32;
    type ValidatorRegistryLimit = U1099511627776;

    type MaxAttestationsPerEpoch = Prod<Self::MaxAttestations, Self::SlotsPerEpoch>;
    type SlotsPerEth1VotingPeriod = Prod<Self::EpochsPerEth1VotingPeriod, Self::SlotsPerEpoch>;
    type SlotsPerHistoricalRoot = Prod<Self::EpochsPerHistoricalRoot, Self::SlotsPerEpoch>;

    const NAME: PresetName = PresetName::Mainnet;
}

/// Smaller committees and shorter epochs for tests.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Minimal;

impl Preset for Minimal {
    type EpochsPerEth1VotingPeriod = U4;
    type EpochsPerHistoricalRoot = U8;
    type EpochsPerHistoricalVector = U64;
    type EpochsPerSlashingsVector = U64;
    type HistoricalRootsLimit = <Mainnet as Preset>::HistoricalRootsLimit;
    type MaxAttestations = <Mainnet as Preset>::MaxAttestations;
    type MaxAttesterSlashings = <Mainnet as Preset>::MaxAttesterSlashings;
    type MaxDeposits = <Mainnet as Preset>::MaxDeposits;
    type MaxProposerSlashings = <Mainnet as Preset>::MaxProposerSlashings;
    type MaxValidatorsPerCommittee = <Mainnet as Preset>::MaxValidatorsPerCommittee;
    type MaxVoluntaryExits = <Mainnet as Preset>::MaxVoluntaryExits;
    type SlotsPerEpoch = U8;
    type ValidatorRegistryLimit = <Mainnet as Preset>::ValidatorRegistryLimit;

    type MaxAttestationsPerEpoch = Prod<Self::MaxAttestations, Self::SlotsPerEpoch>;
    type SlotsPerEth1VotingPeriod = Prod<Self::EpochsPerEth1VotingPeriod, Self::SlotsPerEpoch>;
    type SlotsPerHistoricalRoot = Prod<Self::EpochsPerHistoricalRoot, Self::SlotsPerEpoch>;

    const NAME: PresetName = PresetName::Minimal;

    const MAX_COMMITTEES_PER_SLOT: NonZeroU64 = nonzero!(4_u64);
    const SAFE_SLOTS_TO_UPDATE_JUSTIFIED: u64 = 2;
    const SHUFFLE_ROUND_COUNT: u8 = 10;
    const TARGET_COMMITTEE_SIZE: NonZeroU64 = nonzero!(4_u64);
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug, Display, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetName {
    #[default]
    #[display("mainnet")]
    Mainnet,
    #[display("minimal")]
    Minimal,
}

impl PresetName {
    #[must_use]
    pub fn default_config(self) -> Config {
        match self {
            Self::Mainnet => Config::mainnet(),
            Self::Minimal => Config::minimal(),
        }
    }
}

pub type SlotsPerHistoricalRoot<P> = <P as Preset>::SlotsPerHistoricalRoot;
pub type SlotsPerEth1VotingPeriod<P> = <P as Preset>::SlotsPerEth1VotingPeriod;
pub type MaxAttestationsPerEpoch<P> = <P as Preset>::MaxAttestationsPerEpoch;
