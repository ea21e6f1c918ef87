use derivative::Derivative;
use serde::{Deserialize, Serialize};
use ssz::{BitVector, SszHash};

use crate::{
    cache::Cache,
    collections::{
        Attestations, Balances, Eth1DataVotes, HistoricalRoots, RandaoMixes, RecentRoots,
        Slashings, Validators,
    },
    phase0::{
        consts::JustificationBitsLength,
        containers::{BeaconBlockHeader, Checkpoint, Eth1Data, Fork},
        primitives::{DepositIndex, Slot, UnixSeconds, H256},
    },
    preset::Preset,
};

#[derive(Clone, Default, Debug, Derivative, Deserialize, Serialize, SszHash)]
#[derivative(PartialEq, Eq)]
#[serde(bound = "", deny_unknown_fields)]
pub struct BeaconState<P: Preset> {
    // > Versioning
    pub genesis_time: UnixSeconds,
    pub genesis_validators_root: H256,
    pub slot: Slot,
    pub fork: Fork,

    // > History
    pub latest_block_header: BeaconBlockHeader,
    pub block_roots: RecentRoots<P>,
    pub state_roots: RecentRoots<P>,
    pub historical_roots: HistoricalRoots<P>,

    // > Eth1
    pub eth1_data: Eth1Data,
    pub eth1_data_votes: Eth1DataVotes<P>,
    pub eth1_deposit_index: DepositIndex,

    // > Registry
    pub validators: Validators<P>,
    pub balances: Balances<P>,

    // > Randomness
    pub randao_mixes: RandaoMixes<P>,

    // > Slashings
    pub slashings: Slashings<P>,

    // > Attestations
    pub previous_epoch_attestations: Attestations<P>,
    pub current_epoch_attestations: Attestations<P>,

    // > Finality
    pub justification_bits: BitVector<JustificationBitsLength>,
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,

    // Cache
    #[derivative(PartialEq = "ignore")]
    #[serde(skip)]
    #[ssz(skip)]
    pub cache: Cache,
}

impl<P: Preset> BeaconState<P> {
    /// Replaces the shuffling cache, e.g. with one shared by all states in a `Store`.
    #[must_use]
    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = cache;
        self
    }
}

#[cfg(test)]
mod tests {
    use core::num::NonZeroUsize;

    use crate::preset::Minimal;

    use super::*;

    #[test]
    fn cache_does_not_affect_equality_or_root() {
        let capacity = NonZeroUsize::MIN;
        let state = BeaconState::<Minimal>::default();
        let with_other_cache = state.clone().with_cache(Cache::with_capacity(capacity));

        assert_eq!(state, with_other_cache);
        assert_eq!(state.hash_tree_root(), with_other_cache.hash_tree_root());
    }

    #[test]
    fn root_changes_with_slot() {
        let state = BeaconState::<Minimal>::default();
        let advanced = BeaconState::<Minimal> {
            slot: 1,
            ..state.clone()
        };

        assert_ne!(state.hash_tree_root(), advanced.hash_tree_root());
    }

    #[test]
    fn json_round_trip_preserves_state() -> anyhow::Result<()> {
        let state = BeaconState::<Minimal> {
            slot: 9,
            eth1_deposit_index: 4,
            ..BeaconState::default()
        };

        let json = serde_json::to_string(&state)?;
        let parsed = serde_json::from_str::<BeaconState<Minimal>>(&json)?;

        assert_eq!(parsed, state);

        Ok(())
    }
}
