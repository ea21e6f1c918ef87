use core::{num::NonZeroU64, ops::Range};
use std::sync::Arc;

use anyhow::{bail, ensure, Result};
use arithmetic::{NonZeroExt as _, U64Ext as _};
use bls::PublicKeyBytes;
use integer_sqrt::IntegerSquareRoot as _;
use itertools::Itertools as _;
use ssz::{BitList, ContiguousList, SszHash as _};
use tap::TryConv as _;
use typenum::Unsigned as _;
use types::{
    config::Config,
    nonstandard::{AttestationEpoch, RelativeEpoch},
    phase0::{
        beacon_state::BeaconState,
        consts::{
            BASE_REWARDS_PER_EPOCH, DOMAIN_BEACON_ATTESTER, DOMAIN_BEACON_PROPOSER, GENESIS_EPOCH,
        },
        containers::{Attestation, AttestationData, IndexedAttestation},
        primitives::{
            CommitteeIndex, Domain, DomainType, Epoch, Gwei, Slot, ValidatorIndex, H256,
        },
    },
    preset::{Preset, SlotsPerHistoricalRoot},
};

use crate::{error::Error, misc, predicates};

#[must_use]
pub fn get_current_epoch<P: Preset>(state: &BeaconState<P>) -> Epoch {
    misc::compute_epoch_at_slot::<P>(state.slot)
}

#[must_use]
pub fn get_previous_epoch<P: Preset>(state: &BeaconState<P>) -> Epoch {
    get_current_epoch(state)
        .saturating_sub(1)
        .max(GENESIS_EPOCH)
}

#[must_use]
pub fn get_next_epoch<P: Preset>(state: &BeaconState<P>) -> Epoch {
    get_current_epoch(state) + 1
}

#[must_use]
pub fn absolute_epoch<P: Preset>(state: &BeaconState<P>, relative_epoch: RelativeEpoch) -> Epoch {
    match relative_epoch {
        RelativeEpoch::Previous => get_previous_epoch(state),
        RelativeEpoch::Current => get_current_epoch(state),
        RelativeEpoch::Next => get_next_epoch(state),
    }
}

pub fn attestation_epoch<P: Preset>(
    state: &BeaconState<P>,
    epoch: Epoch,
) -> Result<AttestationEpoch> {
    match get_current_epoch(state).checked_sub(epoch) {
        None => bail!(Error::EpochInTheFuture),
        Some(0) => Ok(AttestationEpoch::Current),
        Some(1) => Ok(AttestationEpoch::Previous),
        Some(_) => bail!(Error::EpochBeforePrevious),
    }
}

pub fn relative_epoch<P: Preset>(state: &BeaconState<P>, epoch: Epoch) -> Result<RelativeEpoch> {
    match get_next_epoch(state).checked_sub(epoch) {
        None => bail!(Error::EpochAfterNext),
        Some(0) => Ok(RelativeEpoch::Next),
        Some(1) => Ok(RelativeEpoch::Current),
        Some(2) => Ok(RelativeEpoch::Previous),
        Some(_) => bail!(Error::EpochBeforePrevious),
    }
}

#[must_use]
pub fn get_finality_delay<P: Preset>(state: &BeaconState<P>) -> u64 {
    get_previous_epoch(state).saturating_sub(state.finalized_checkpoint.epoch)
}

/// Root of the block at the start of `attestation_epoch`, or of the latest block before it.
pub fn get_block_root<P: Preset>(
    state: &BeaconState<P>,
    attestation_epoch: AttestationEpoch,
) -> Result<H256> {
    let epoch = absolute_epoch(state, attestation_epoch.into());
    let slot = misc::compute_start_slot_at_epoch::<P>(epoch);
    get_block_root_at_slot(state, slot)
}

pub fn get_block_root_at_slot<P: Preset>(state: &BeaconState<P>, slot: Slot) -> Result<H256> {
    let in_range =
        slot < state.slot && state.slot <= slot.saturating_add(SlotsPerHistoricalRoot::<P>::U64);

    ensure!(
        in_range,
        Error::SlotOutOfRange {
            slot,
            state_slot: state.slot,
        },
    );

    Ok(*state.block_roots.mod_index(slot))
}

/// Root of `state.latest_block_header` with its state root filled in the way
/// `process_slot` would.
#[must_use]
pub fn latest_block_root<P: Preset>(state: &BeaconState<P>) -> H256 {
    let mut header = state.latest_block_header;

    if header.state_root.is_zero() {
        header.state_root = state.hash_tree_root();
    }

    header.hash_tree_root()
}

#[must_use]
pub fn get_randao_mix<P: Preset>(state: &BeaconState<P>, epoch: Epoch) -> H256 {
    *state.randao_mixes.mod_index(epoch)
}

pub fn get_active_validator_indices<P: Preset>(
    state: &BeaconState<P>,
    epoch: Epoch,
) -> impl Iterator<Item = ValidatorIndex> + '_ {
    (0..)
        .zip(&state.validators)
        .filter(move |(_, validator)| predicates::is_active_validator(validator, epoch))
        .map(|(validator_index, _)| validator_index)
}

#[must_use]
pub fn active_validator_count<P: Preset>(state: &BeaconState<P>, epoch: Epoch) -> u64 {
    state
        .validators
        .iter()
        .filter(|validator| predicates::is_active_validator(validator, epoch))
        .count()
        .try_conv::<u64>()
        .unwrap_or(u64::MAX)
}

#[must_use]
pub fn get_validator_churn_limit<P: Preset>(config: &Config, state: &BeaconState<P>) -> u64 {
    let active_validator_count = active_validator_count(state, get_current_epoch(state));

    (active_validator_count / config.churn_limit_quotient).max(config.min_per_epoch_churn_limit)
}

#[must_use]
pub fn get_seed<P: Preset>(state: &BeaconState<P>, epoch: Epoch, domain_type: DomainType) -> H256 {
    let mix_epoch = epoch + P::EpochsPerHistoricalVector::U64 - P::MIN_SEED_LOOKAHEAD - 1;
    let mix = get_randao_mix(state, mix_epoch);

    let bytes = [
        domain_type.as_bytes(),
        epoch.to_le_bytes().as_slice(),
        mix.as_bytes(),
    ]
    .concat();

    hashing::hash_bytes(bytes)
}

#[must_use]
pub fn get_committee_count_per_slot<P: Preset>(state: &BeaconState<P>, epoch: Epoch) -> u64 {
    misc::committee_count_from_active_validator_count::<P>(active_validator_count(state, epoch))
}

/// Active validators at `epoch` in the order committees are cut from.
///
/// The permutation is shared through `state.cache` by all states with the same seed and active
/// validators at `epoch`.
pub fn shuffled_active_validator_indices<P: Preset>(
    state: &BeaconState<P>,
    epoch: Epoch,
) -> Result<Arc<[ValidatorIndex]>> {
    let seed = get_seed(state, epoch, DOMAIN_BEACON_ATTESTER);
    let active_validator_indices = get_active_validator_indices(state, epoch).collect_vec();

    state
        .cache
        .shuffled_indices(seed, &active_validator_indices, |indices| {
            shuffling::shuffle_slice::<P, _>(indices, seed)
        })
}

/// Members of one beacon committee, borrowed from a shared shuffling.
#[derive(Clone, Debug)]
pub struct Committee {
    shuffled: Arc<[ValidatorIndex]>,
    range: Range<usize>,
}

impl core::ops::Deref for Committee {
    type Target = [ValidatorIndex];

    fn deref(&self) -> &Self::Target {
        &self.shuffled[self.range.clone()]
    }
}

pub fn beacon_committee<P: Preset>(
    state: &BeaconState<P>,
    slot: Slot,
    committee_index: CommitteeIndex,
) -> Result<Committee> {
    let epoch = misc::compute_epoch_at_slot::<P>(slot);
    let committees_per_slot = get_committee_count_per_slot(state, epoch);

    ensure!(
        committee_index < committees_per_slot,
        Error::CommitteeIndexOutOfBounds {
            index: committee_index,
            committees_per_slot,
        },
    );

    let shuffled = shuffled_active_validator_indices(state, epoch)?;
    let length = shuffled.len().try_conv::<u64>()?;

    let committee_count = NonZeroU64::new(committees_per_slot)
        .ok_or(Error::NoActiveValidators)?
        .saturating_mul(P::SlotsPerEpoch::non_zero());

    let index = misc::slots_since_epoch_start::<P>(slot) * committees_per_slot + committee_index;
    let start = length.mul_div(index, committee_count).try_conv::<usize>()?;
    let end = length.mul_div(index + 1, committee_count).try_conv::<usize>()?;

    Ok(Committee {
        shuffled,
        range: start..end,
    })
}

pub fn beacon_committees<P: Preset>(state: &BeaconState<P>, slot: Slot) -> Result<Vec<Committee>> {
    let epoch = misc::compute_epoch_at_slot::<P>(slot);

    (0..get_committee_count_per_slot(state, epoch))
        .map(|committee_index| beacon_committee(state, slot, committee_index))
        .collect()
}

pub fn get_beacon_proposer_index<P: Preset>(state: &BeaconState<P>) -> Result<ValidatorIndex> {
    get_beacon_proposer_index_at_slot(state, state.slot)
}

/// Proposer for `slot` as seen by `state`.
///
/// Only reliable for slots in the current epoch of `state`, because proposer sampling reads
/// effective balances.
pub fn get_beacon_proposer_index_at_slot<P: Preset>(
    state: &BeaconState<P>,
    slot: Slot,
) -> Result<ValidatorIndex> {
    let epoch = misc::compute_epoch_at_slot::<P>(slot);
    let seed = hashing::hash_256_64(get_seed(state, epoch, DOMAIN_BEACON_PROPOSER), slot);
    let indices = get_active_validator_indices(state, epoch).collect_vec();

    misc::compute_proposer_index(state, &indices, seed)
}

#[must_use]
pub fn get_domain<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    domain_type: DomainType,
    epoch: Option<Epoch>,
) -> Domain {
    let epoch = epoch.unwrap_or_else(|| get_current_epoch(state));
    let fork = state.fork;

    let fork_version = if epoch < fork.epoch {
        fork.previous_version
    } else {
        fork.current_version
    };

    misc::compute_domain(
        config,
        domain_type,
        Some(fork_version),
        Some(state.genesis_validators_root),
    )
}

pub fn get_indexed_attestation<P: Preset>(
    state: &BeaconState<P>,
    attestation: &Attestation<P>,
) -> Result<IndexedAttestation<P>> {
    let mut attesting_indices =
        get_attesting_indices(state, attestation.data, &attestation.aggregation_bits)?;

    attesting_indices.sort_unstable();

    Ok(IndexedAttestation {
        attesting_indices: ContiguousList::try_from_iter(attesting_indices)?,
        data: attestation.data,
        signature: attestation.signature,
    })
}

/// Members of the committee of `attestation_data` whose bits are set, in committee order.
pub fn get_attesting_indices<P: Preset>(
    state: &BeaconState<P>,
    attestation_data: AttestationData,
    aggregation_bits: &BitList<P::MaxValidatorsPerCommittee>,
) -> Result<Vec<ValidatorIndex>> {
    let committee = beacon_committee(state, attestation_data.slot, attestation_data.index)?;

    ensure!(
        committee.len() == aggregation_bits.len(),
        Error::CommitteeLengthMismatch {
            aggregation_bitlist_length: aggregation_bits.len(),
            committee_length: committee.len(),
        },
    );

    let attesting_indices = committee
        .iter()
        .zip(aggregation_bits.iter().by_vals())
        .filter_map(|(validator_index, present)| present.then_some(*validator_index))
        .collect();

    Ok(attesting_indices)
}

/// Sum of effective balances of `indices`, but at least `EFFECTIVE_BALANCE_INCREMENT` to avoid
/// dividing by zero.
pub fn get_total_balance<P: Preset>(
    state: &BeaconState<P>,
    indices: impl IntoIterator<Item = ValidatorIndex>,
) -> Result<Gwei> {
    let mut total = 0;

    for validator_index in indices {
        total += state.validators.get(validator_index)?.effective_balance;
    }

    Ok(total.max(P::EFFECTIVE_BALANCE_INCREMENT.get()))
}

#[must_use]
pub fn get_total_active_balance<P: Preset>(state: &BeaconState<P>) -> Gwei {
    let epoch = get_current_epoch(state);

    state
        .validators
        .iter()
        .filter(|validator| predicates::is_active_validator(validator, epoch))
        .map(|validator| validator.effective_balance)
        .sum::<Gwei>()
        .max(P::EFFECTIVE_BALANCE_INCREMENT.get())
}

/// Base reward for a validator with `effective_balance`, given the square root of the total
/// active balance.
#[must_use]
pub fn base_reward<P: Preset>(effective_balance: Gwei, total_balance_sqrt: NonZeroU64) -> Gwei {
    effective_balance * P::BASE_REWARD_FACTOR / total_balance_sqrt / BASE_REWARDS_PER_EPOCH
}

pub fn get_base_reward<P: Preset>(
    state: &BeaconState<P>,
    validator_index: ValidatorIndex,
    total_active_balance: Gwei,
) -> Result<Gwei> {
    let effective_balance = state.validators.get(validator_index)?.effective_balance;
    let total_balance_sqrt = total_balance_sqrt(total_active_balance)?;

    Ok(base_reward::<P>(effective_balance, total_balance_sqrt))
}

pub fn total_balance_sqrt(total_balance: Gwei) -> Result<NonZeroU64> {
    NonZeroU64::new(total_balance.integer_sqrt()).ok_or_else(|| Error::NoActiveValidators.into())
}

#[must_use]
pub fn index_of_public_key<P: Preset>(
    state: &BeaconState<P>,
    public_key: PublicKeyBytes,
) -> Option<ValidatorIndex> {
    (0..)
        .zip(&state.validators)
        .find(|(_, validator)| validator.pubkey == public_key)
        .map(|(validator_index, _)| validator_index)
}

#[derive(Clone, Debug)]
pub struct CommitteeAssignment {
    pub committee: Committee,
    pub committee_index: CommitteeIndex,
    pub slot: Slot,
}

/// Finds the committee `validator_index` is assigned to in `epoch`.
///
/// `epoch` may be at most one epoch after the current one.
pub fn get_committee_assignment<P: Preset>(
    state: &BeaconState<P>,
    epoch: Epoch,
    validator_index: ValidatorIndex,
) -> Result<Option<CommitteeAssignment>> {
    ensure!(epoch <= get_next_epoch(state), Error::EpochAfterNext);

    let start_slot = misc::compute_start_slot_at_epoch::<P>(epoch);
    let committees_per_slot = get_committee_count_per_slot(state, epoch);

    for slot in start_slot..start_slot + P::SlotsPerEpoch::U64 {
        for committee_index in 0..committees_per_slot {
            let committee = beacon_committee(state, slot, committee_index)?;

            if committee.contains(&validator_index) {
                return Ok(Some(CommitteeAssignment {
                    committee,
                    committee_index,
                    slot,
                }));
            }
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use types::{
        phase0::{consts::FAR_FUTURE_EPOCH, containers::Validator},
        preset::Minimal,
    };

    use super::*;

    fn state_with_validators(effective_balances: &[Gwei]) -> Result<BeaconState<Minimal>> {
        let validators = effective_balances
            .iter()
            .map(|effective_balance| Validator {
                effective_balance: *effective_balance,
                exit_epoch: FAR_FUTURE_EPOCH,
                withdrawable_epoch: FAR_FUTURE_EPOCH,
                ..Validator::default()
            })
            .collect_vec();

        Ok(BeaconState {
            balances: ContiguousList::try_from_iter(effective_balances.iter().copied())?,
            validators: ContiguousList::try_from(validators)?,
            ..BeaconState::default()
        })
    }

    #[test]
    fn committees_cover_every_active_validator_once_per_epoch() -> Result<()> {
        let state = state_with_validators(&[Minimal::MAX_EFFECTIVE_BALANCE; 100])?;

        let mut members = (0..<Minimal as Preset>::SlotsPerEpoch::U64)
            .map(|slot| beacon_committees(&state, slot))
            .flatten_ok()
            .map_ok(|committee| committee.to_vec())
            .flatten_ok()
            .collect::<Result<Vec<_>>>()?;

        members.sort_unstable();

        assert!(members.into_iter().eq(0..100));

        Ok(())
    }

    #[test]
    fn cached_committees_match_direct_computation() -> Result<()> {
        let state = state_with_validators(&[Minimal::MAX_EFFECTIVE_BALANCE; 70])?;
        let epoch = get_current_epoch(&state);
        let seed = get_seed(&state, epoch, DOMAIN_BEACON_ATTESTER);
        let indices = get_active_validator_indices(&state, epoch).collect_vec();
        let committees_per_slot = get_committee_count_per_slot(&state, epoch);
        let slots_per_epoch = <Minimal as Preset>::SlotsPerEpoch::U64;
        let count = NonZeroU64::new(committees_per_slot * slots_per_epoch)
            .ok_or(Error::NoActiveValidators)?;

        for slot in 0..slots_per_epoch {
            for committee_index in 0..committees_per_slot {
                let cached = beacon_committee(&state, slot, committee_index)?;
                let index = slot * committees_per_slot + committee_index;
                let direct = misc::compute_committee::<Minimal>(&indices, seed, index, count)?;

                assert_eq!(cached.to_vec(), direct);
            }
        }

        assert!(beacon_committee(&state, 0, committees_per_slot).is_err());

        Ok(())
    }

    #[test]
    fn proposer_selection_is_weighted_by_effective_balance() -> Result<()> {
        let effective_balances = [[32_000_000_000; 50], [16_000_000_000; 50]].concat();
        let state = state_with_validators(&effective_balances)?;
        let indices = (0..100).collect_vec();
        let mut heavy_selections = 0;

        for nonce in 0..3000 {
            let seed = hashing::hash_256_64(H256::zero(), nonce);

            if misc::compute_proposer_index(&state, &indices, seed)? < 50 {
                heavy_selections += 1;
            }
        }

        // Candidates are accepted with probability proportional to effective balance,
        // so the expected share of the heavier half is 2/3.
        assert!((1850..=2150).contains(&heavy_selections));

        Ok(())
    }

    #[test]
    fn block_roots_are_only_available_for_recent_past() -> Result<()> {
        let mut state = state_with_validators(&[])?;
        state.slot = 100;
        *state.block_roots.mod_index_mut(99) = H256::repeat_byte(9);

        assert_eq!(get_block_root_at_slot(&state, 99)?, H256::repeat_byte(9));
        assert!(get_block_root_at_slot(&state, 100).is_err());
        assert!(get_block_root_at_slot(&state, 100 - 65).is_err());

        Ok(())
    }

    #[test]
    fn attestation_epoch_is_current_or_previous() -> Result<()> {
        let mut state = state_with_validators(&[])?;
        state.slot = 3 * <Minimal as Preset>::SlotsPerEpoch::U64;

        assert_eq!(attestation_epoch(&state, 3)?, AttestationEpoch::Current);
        assert_eq!(attestation_epoch(&state, 2)?, AttestationEpoch::Previous);
        assert!(attestation_epoch(&state, 1).is_err());
        assert!(attestation_epoch(&state, 4).is_err());

        Ok(())
    }

    #[test]
    fn committee_assignment_is_found_for_active_validator() -> Result<()> {
        let state = state_with_validators(&[Minimal::MAX_EFFECTIVE_BALANCE; 40])?;

        let assignment =
            get_committee_assignment(&state, 0, 17)?.ok_or(Error::NoActiveValidators)?;

        assert!(assignment.committee.contains(&17));
        assert_eq!(
            beacon_committee(&state, assignment.slot, assignment.committee_index)?.to_vec(),
            assignment.committee.to_vec(),
        );
        assert!(get_committee_assignment(&state, 0, 40)?.is_none());
        assert!(get_committee_assignment(&state, 2, 17).is_err());

        Ok(())
    }
}
