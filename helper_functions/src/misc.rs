use core::{num::NonZeroU64, ops::Div as _};

use anyhow::{ensure, Result};
use arithmetic::{NonZeroExt as _, U64Ext as _};
use bls::PublicKeyBytes;
use ssz::SszHash;
use tap::{Pipe as _, TryConv as _};
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        consts::{AttestationSubnetCount, BLS_WITHDRAWAL_PREFIX},
        containers::{ForkData, SigningData},
        primitives::{
            CommitteeIndex, Domain, DomainType, Epoch, Slot, SubnetId, UnixSeconds,
            ValidatorIndex, Version, H256,
        },
    },
    preset::Preset,
};

use crate::error::Error;

#[must_use]
pub fn compute_epoch_at_slot<P: Preset>(slot: Slot) -> Epoch {
    slot.div_typenum::<P::SlotsPerEpoch>()
}

#[must_use]
pub fn compute_start_slot_at_epoch<P: Preset>(epoch: Epoch) -> Slot {
    epoch.saturating_mul(P::SlotsPerEpoch::non_zero().get())
}

#[must_use]
pub fn is_epoch_start<P: Preset>(slot: Slot) -> bool {
    slots_since_epoch_start::<P>(slot) == 0
}

#[must_use]
pub fn slots_since_epoch_start<P: Preset>(slot: Slot) -> u64 {
    slot.mod_typenum::<P::SlotsPerEpoch>()
}

/// The epoch at which an activation or exit initiated in `epoch` takes effect.
#[must_use]
pub const fn compute_activation_exit_epoch<P: Preset>(epoch: Epoch) -> Epoch {
    epoch + 1 + P::MAX_SEED_LOOKAHEAD
}

#[must_use]
pub fn compute_timestamp_at_slot<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    slot: Slot,
) -> UnixSeconds {
    state.genesis_time + slot * config.seconds_per_slot.get()
}

#[must_use]
pub fn compute_fork_data_root(current_version: Version, genesis_validators_root: H256) -> H256 {
    ForkData {
        current_version,
        genesis_validators_root,
    }
    .hash_tree_root()
}

/// Missing arguments default to the genesis fork version and a zero validators root, which is
/// what deposits are signed with.
#[must_use]
pub fn compute_domain(
    config: &Config,
    domain_type: DomainType,
    fork_version: Option<Version>,
    genesis_validators_root: Option<H256>,
) -> Domain {
    let fork_version = fork_version.unwrap_or(config.genesis_fork_version);
    let genesis_validators_root = genesis_validators_root.unwrap_or_default();
    let fork_data_root = compute_fork_data_root(fork_version, genesis_validators_root);

    let mut domain = Domain::zero();
    domain[..DomainType::len_bytes()].copy_from_slice(domain_type.as_bytes());
    domain[DomainType::len_bytes()..].copy_from_slice(&fork_data_root[..28]);
    domain
}

pub fn compute_signing_root(object: &(impl SszHash + ?Sized), domain: Domain) -> H256 {
    SigningData {
        object_root: object.hash_tree_root(),
        domain,
    }
    .hash_tree_root()
}

pub fn compute_shuffled_index<P: Preset>(
    index: u64,
    index_count: NonZeroU64,
    seed: H256,
) -> Result<u64> {
    shuffling::shuffle_single::<P>(index, index_count, seed)
        .ok_or_else(|| Error::NoActiveValidators.into())
}

/// Selects members `[len * index / count, len * (index + 1) / count)` of `indices` in shuffled
/// order.
///
/// Computes the permutation one element at a time. `accessors::beacon_committee` produces the
/// same result from a cached permutation of the whole list.
pub fn compute_committee<P: Preset>(
    indices: &[ValidatorIndex],
    seed: H256,
    index: u64,
    count: NonZeroU64,
) -> Result<Vec<ValidatorIndex>> {
    let length = indices.len().try_conv::<u64>()?;

    let Some(index_count) = NonZeroU64::new(length) else {
        return Ok(vec![]);
    };

    let start = length.mul_div(index, count);
    let end = length.mul_div(index + 1, count);

    (start..end)
        .map(|position| {
            let shuffled = compute_shuffled_index::<P>(position, index_count, seed)?;
            let validator_index = indices[shuffled.try_conv::<usize>()?];
            Ok(validator_index)
        })
        .collect()
}

/// Samples a proposer from `indices` with probability proportional to effective balance.
pub fn compute_proposer_index<P: Preset>(
    state: &BeaconState<P>,
    indices: &[ValidatorIndex],
    seed: H256,
) -> Result<ValidatorIndex> {
    let total = indices
        .len()
        .try_conv::<u64>()?
        .pipe(NonZeroU64::new)
        .ok_or(Error::NoActiveValidators)?;

    let max_random_byte = u64::from(u8::MAX);

    for attempt in 0_u64.. {
        let shuffled = compute_shuffled_index::<P>(attempt % total, total, seed)?;
        let candidate_index = indices[shuffled.try_conv::<usize>()?];

        let random_bytes = hashing::hash_256_64(seed, attempt / 32);
        let random_byte = u64::from(random_bytes[(attempt % 32).try_conv::<usize>()?]);

        let effective_balance = state.validators.get(candidate_index)?.effective_balance;

        if effective_balance * max_random_byte >= P::MAX_EFFECTIVE_BALANCE * random_byte {
            return Ok(candidate_index);
        }
    }

    Err(Error::FailedToSelectProposer.into())
}

pub fn compute_subnet_for_attestation<P: Preset>(
    committees_per_slot: u64,
    slot: Slot,
    committee_index: CommitteeIndex,
) -> Result<SubnetId> {
    ensure!(
        committee_index < committees_per_slot,
        Error::CommitteeIndexOutOfBounds {
            index: committee_index,
            committees_per_slot,
        },
    );

    let committees_since_epoch_start = committees_per_slot * slots_since_epoch_start::<P>(slot);

    Ok((committees_since_epoch_start + committee_index).mod_typenum::<AttestationSubnetCount>())
}

#[must_use]
pub fn committee_count_from_active_validator_count<P: Preset>(active_validator_count: u64) -> u64 {
    active_validator_count
        .div_typenum::<P::SlotsPerEpoch>()
        .div(P::TARGET_COMMITTEE_SIZE)
        .clamp(1, P::MAX_COMMITTEES_PER_SLOT.get())
}

#[must_use]
pub fn bls_withdrawal_credentials(public_key: PublicKeyBytes) -> H256 {
    let mut withdrawal_credentials = hashing::hash_384(public_key);
    withdrawal_credentials.as_bytes_mut()[0] = BLS_WITHDRAWAL_PREFIX;
    withdrawal_credentials
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use test_case::test_case;
    use types::{
        phase0::consts::{DOMAIN_BEACON_ATTESTER, DOMAIN_DEPOSIT},
        preset::{Mainnet, Minimal},
    };

    use super::*;

    #[test_case(0 => 0)]
    #[test_case(7 => 0)]
    #[test_case(8 => 1)]
    #[test_case(17 => 2)]
    fn epoch_at_slot_for_minimal(slot: Slot) -> Epoch {
        compute_epoch_at_slot::<Minimal>(slot)
    }

    #[test]
    fn activation_exit_epoch_adds_lookahead() {
        assert_eq!(compute_activation_exit_epoch::<Mainnet>(10), 15);
    }

    #[test]
    fn domain_starts_with_domain_type() {
        let config = Config::mainnet();
        let domain = compute_domain(&config, DOMAIN_BEACON_ATTESTER, None, None);
        let fork_data_root = compute_fork_data_root(config.genesis_fork_version, H256::zero());

        assert_eq!(domain[..4], hex!("01000000"));
        assert_eq!(domain[4..], fork_data_root[..28]);
    }

    #[test]
    fn deposit_domain_depends_only_on_genesis_fork_version() {
        let mainnet = compute_domain(&Config::mainnet(), DOMAIN_DEPOSIT, None, None);
        let minimal = compute_domain(&Config::minimal(), DOMAIN_DEPOSIT, None, None);

        assert_ne!(mainnet, minimal);
    }

    #[test_case(0 => 1)]
    #[test_case(64 => 2)]
    #[test_case(128 => 4)]
    #[test_case(1_000_000 => 4)]
    fn committee_count_for_minimal(active_validator_count: u64) -> u64 {
        committee_count_from_active_validator_count::<Minimal>(active_validator_count)
    }

    #[test]
    fn committees_partition_indices() -> Result<()> {
        let indices = (0..100).collect::<Vec<_>>();
        let seed = H256::repeat_byte(3);
        let count = NonZeroU64::new(7).ok_or(Error::NoActiveValidators)?;

        let mut members = (0..count.get())
            .map(|index| compute_committee::<Minimal>(&indices, seed, index, count))
            .collect::<Result<Vec<_>>>()?
            .concat();

        members.sort_unstable();

        assert_eq!(members, indices);

        Ok(())
    }

    #[test_case(4, 0, 0 => 0)]
    #[test_case(4, 1, 3 => 7)]
    #[test_case(64, 7, 63 => 63)]
    fn subnet_for_attestation(
        committees_per_slot: u64,
        slot: Slot,
        committee_index: CommitteeIndex,
    ) -> SubnetId {
        compute_subnet_for_attestation::<Minimal>(committees_per_slot, slot, committee_index)
            .expect("committee index is in bounds")
    }

    #[test]
    fn subnet_for_attestation_rejects_out_of_bounds_index() {
        assert!(compute_subnet_for_attestation::<Minimal>(4, 0, 4).is_err());
    }

    #[test]
    fn bls_withdrawal_credentials_start_with_prefix() {
        let credentials = bls_withdrawal_credentials(PublicKeyBytes::repeat_byte(1));

        assert_eq!(credentials[0], BLS_WITHDRAWAL_PREFIX);
        assert_eq!(
            credentials[1..],
            hashing::hash_bytes([1; 48]).as_bytes()[1..],
        );
    }
}
