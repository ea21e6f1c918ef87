use anyhow::{ensure, Result};
use arithmetic::U64Ext as _;
use helper_functions::{
    accessors::{
        attestation_epoch, get_beacon_proposer_index, get_current_epoch, get_indexed_attestation,
        get_randao_mix, index_of_public_key,
    },
    misc::compute_epoch_at_slot,
    mutators::{balance, increase_balance, initiate_validator_exit, slash_validator},
    predicates::{
        is_active_validator, is_slashable_attestation_data, is_slashable_validator,
        is_valid_merkle_branch, validate_indexed_attestation,
    },
    signing::{RandaoEpoch, SignForAllForks as _, SignForSingleFork as _},
    verifier::Verifier,
};
use itertools::{EitherOrBoth, Itertools as _};
use log::debug;
use ssz::SszHash as _;
use typenum::Unsigned as _;
use types::{
    config::Config,
    nonstandard::AttestationEpoch,
    phase0::{
        beacon_state::BeaconState,
        consts::FAR_FUTURE_EPOCH,
        containers::{
            Attestation, AttestationData, AttesterSlashing, BeaconBlock, BeaconBlockBody,
            BeaconBlockHeader, Deposit, DepositData, DepositMessage, PendingAttestation,
            ProposerSlashing, SignedVoluntaryExit, Validator,
        },
        primitives::{DepositIndex, ValidatorIndex, H256},
    },
    preset::{Preset, SlotsPerEth1VotingPeriod},
};

use crate::Error;

/// Applies `block` to a state that has already been advanced to `block.slot`.
///
/// Also serves as the core of `compute_new_state_root`, which cannot use `state_transition`
/// because `process_slots` rejects states already at `block.slot`.
pub fn process_block<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    block: &BeaconBlock<P>,
    mut verifier: impl Verifier,
) -> Result<()> {
    process_block_header(state, block)?;
    process_randao(config, state, &block.body, &mut verifier)?;
    process_eth1_data(state, &block.body)?;
    process_operations(config, state, &block.body, verifier)
}

pub fn process_block_header<P: Preset>(
    state: &mut BeaconState<P>,
    block: &BeaconBlock<P>,
) -> Result<()> {
    // > Verify that the slots match
    ensure!(
        block.slot == state.slot,
        Error::<P>::SlotMismatch {
            state_slot: state.slot,
            block_slot: block.slot,
        },
    );

    // > Verify that the block is newer than latest block header
    ensure!(
        block.slot > state.latest_block_header.slot,
        Error::<P>::BlockNotNewerThanLatestBlockHeader {
            block_slot: block.slot,
            block_header_slot: state.latest_block_header.slot,
        },
    );

    // > Verify that proposer index is the correct index
    let computed = get_beacon_proposer_index(state)?;
    let in_block = block.proposer_index;

    ensure!(
        computed == in_block,
        Error::<P>::ProposerIndexMismatch { computed, in_block },
    );

    // > Verify that the parent matches
    let computed = state.latest_block_header.hash_tree_root();
    let in_block = block.parent_root;

    ensure!(
        computed == in_block,
        Error::<P>::ParentRootMismatch { computed, in_block },
    );

    // > Cache current block as the new latest block
    state.latest_block_header = BeaconBlockHeader {
        slot: block.slot,
        proposer_index: block.proposer_index,
        parent_root: block.parent_root,
        // > Overwritten in the next process_slot call
        state_root: H256::zero(),
        body_root: block.body.hash_tree_root(),
    };

    // > Verify proposer is not slashed
    let index = block.proposer_index;
    let proposer = state.validators.get(index)?;

    ensure!(!proposer.slashed, Error::<P>::ProposerSlashed { index });

    Ok(())
}

pub fn process_randao<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    body: &BeaconBlockBody<P>,
    verifier: impl Verifier,
) -> Result<()> {
    let epoch = get_current_epoch(state);

    // > Verify RANDAO reveal
    let proposer_index = get_beacon_proposer_index(state)?;
    let public_key = state.validators.get(proposer_index)?.pubkey;

    RandaoEpoch::from(epoch).verify(config, state, body.randao_reveal, public_key, verifier)?;

    // > Mix in RANDAO reveal
    let mix = get_randao_mix(state, epoch) ^ hashing::hash_768(body.randao_reveal);
    *state.randao_mixes.mod_index_mut(epoch) = mix;

    Ok(())
}

pub fn process_eth1_data<P: Preset>(
    state: &mut BeaconState<P>,
    body: &BeaconBlockBody<P>,
) -> Result<()> {
    state.eth1_data_votes.push(body.eth1_data)?;

    let vote_count = state
        .eth1_data_votes
        .iter()
        .filter(|vote| **vote == body.eth1_data)
        .count();

    if vote_count * 2 > SlotsPerEth1VotingPeriod::<P>::USIZE {
        state.eth1_data = body.eth1_data;
    }

    Ok(())
}

fn process_operations<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    body: &BeaconBlockBody<P>,
    mut verifier: impl Verifier,
) -> Result<()> {
    // > Verify that outstanding deposits are processed up to the maximum number of deposits
    let computed = P::MaxDeposits::U64.min(
        state
            .eth1_data
            .deposit_count
            .saturating_sub(state.eth1_deposit_index),
    );
    let in_block = body.deposits.len_u64();

    ensure!(
        computed == in_block,
        Error::<P>::DepositCountMismatch { computed, in_block },
    );

    for proposer_slashing in body.proposer_slashings.iter().copied() {
        process_proposer_slashing(config, state, proposer_slashing, &mut verifier)?;
    }

    for attester_slashing in &body.attester_slashings {
        process_attester_slashing(config, state, attester_slashing, &mut verifier)?;
    }

    for attestation in &body.attestations {
        process_attestation(config, state, attestation, &mut verifier)?;
    }

    for deposit in &body.deposits {
        process_deposit(config, state, deposit, &mut verifier)?;
    }

    for voluntary_exit in body.voluntary_exits.iter().copied() {
        process_voluntary_exit(config, state, voluntary_exit, &mut verifier)?;
    }

    Ok(())
}

fn process_proposer_slashing<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    proposer_slashing: ProposerSlashing,
    verifier: impl Verifier,
) -> Result<()> {
    validate_proposer_slashing(config, state, proposer_slashing, verifier)?;

    let index = proposer_slashing.signed_header_1.message.proposer_index;

    slash_validator(config, state, index, None)
}

pub fn validate_proposer_slashing<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    proposer_slashing: ProposerSlashing,
    mut verifier: impl Verifier,
) -> Result<()> {
    let header_1 = proposer_slashing.signed_header_1.message;
    let header_2 = proposer_slashing.signed_header_2.message;

    // > Verify header slots match
    ensure!(
        header_1.slot == header_2.slot,
        Error::<P>::ProposerSlashingSlotMismatch {
            slot_1: header_1.slot,
            slot_2: header_2.slot,
        },
    );

    // > Verify header proposer indices match
    ensure!(
        header_1.proposer_index == header_2.proposer_index,
        Error::<P>::ProposerSlashingProposerMismatch {
            proposer_index_1: header_1.proposer_index,
            proposer_index_2: header_2.proposer_index,
        },
    );

    // > Verify the headers are different
    ensure!(
        header_1 != header_2,
        Error::<P>::ProposerSlashingHeadersIdentical { header: header_1 },
    );

    // > Verify the proposer is slashable
    let index = header_1.proposer_index;
    let proposer = state.validators.get(index)?;

    ensure!(
        is_slashable_validator(proposer, get_current_epoch(state)),
        Error::<P>::ProposerNotSlashable {
            index,
            proposer: *proposer,
        },
    );

    // > Verify signatures
    for signed_header in [
        proposer_slashing.signed_header_1,
        proposer_slashing.signed_header_2,
    ] {
        signed_header.message.verify(
            config,
            state,
            signed_header.signature,
            proposer.pubkey,
            &mut verifier,
        )?;
    }

    Ok(())
}

fn process_attester_slashing<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    attester_slashing: &AttesterSlashing<P>,
    verifier: impl Verifier,
) -> Result<()> {
    let slashable_indices = validate_attester_slashing(config, state, attester_slashing, verifier)?;

    for validator_index in slashable_indices {
        slash_validator(config, state, validator_index, None)?;
    }

    Ok(())
}

/// Returns the indices the slashing applies to, in ascending order.
pub fn validate_attester_slashing<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    attester_slashing: &AttesterSlashing<P>,
    mut verifier: impl Verifier,
) -> Result<Vec<ValidatorIndex>> {
    let attestation_1 = &attester_slashing.attestation_1;
    let attestation_2 = &attester_slashing.attestation_2;

    let data_1 = attestation_1.data;
    let data_2 = attestation_2.data;

    ensure!(
        is_slashable_attestation_data(data_1, data_2),
        Error::<P>::AttestationDataNotSlashable { data_1, data_2 },
    );

    validate_indexed_attestation(config, state, attestation_1, &mut verifier)?;
    validate_indexed_attestation(config, state, attestation_2, &mut verifier)?;

    let current_epoch = get_current_epoch(state);

    // Both index lists are sorted, so merging them finds the intersection in order.
    let mut slashable_indices = vec![];

    for either_or_both in attestation_1
        .attesting_indices
        .iter()
        .merge_join_by(attestation_2.attesting_indices.iter(), Ord::cmp)
    {
        if let EitherOrBoth::Both(attester_index, _) = either_or_both {
            let attester = state.validators.get(*attester_index)?;

            if is_slashable_validator(attester, current_epoch) {
                slashable_indices.push(*attester_index);
            }
        }
    }

    ensure!(
        !slashable_indices.is_empty(),
        Error::<P>::NoAttestersSlashed,
    );

    Ok(slashable_indices)
}

fn process_attestation<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    attestation: &Attestation<P>,
    verifier: impl Verifier,
) -> Result<()> {
    let attestation_epoch = validate_attestation(config, state, attestation, verifier)?;

    let pending_attestation = PendingAttestation::new(
        attestation,
        state.slot - attestation.data.slot,
        get_beacon_proposer_index(state)?,
    );

    let attestations = match attestation_epoch {
        AttestationEpoch::Previous => &mut state.previous_epoch_attestations,
        AttestationEpoch::Current => &mut state.current_epoch_attestations,
    };

    attestations.push(pending_attestation).map_err(Into::into)
}

/// Checks that `attestation` can be included in a block applied to `state`.
///
/// Returns the epoch whose pending attestations it belongs to.
pub fn validate_attestation<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    attestation: &Attestation<P>,
    verifier: impl Verifier,
) -> Result<AttestationEpoch> {
    let AttestationData {
        slot: attestation_slot,
        source,
        target,
        ..
    } = attestation.data;

    // Blocks cannot contain attestations from the future or epochs before the previous one.
    let attestation_epoch = attestation_epoch(state, target.epoch)?;

    ensure!(
        target.epoch == compute_epoch_at_slot::<P>(attestation_slot),
        Error::AttestationTargetsWrongEpoch {
            attestation: attestation.clone(),
        },
    );

    let low_slot = attestation_slot + P::MIN_ATTESTATION_INCLUSION_DELAY.get();
    let high_slot = attestation_slot + P::SlotsPerEpoch::U64;

    ensure!(
        (low_slot..=high_slot).contains(&state.slot),
        Error::<P>::AttestationOutsideInclusionRange {
            state_slot: state.slot,
            attestation_slot,
        },
    );

    let in_state = match attestation_epoch {
        AttestationEpoch::Previous => state.previous_justified_checkpoint,
        AttestationEpoch::Current => state.current_justified_checkpoint,
    };
    let in_block = source;

    ensure!(
        in_state == in_block,
        Error::<P>::AttestationSourceMismatch { in_state, in_block },
    );

    // The committee index and the length of `aggregation_bits` are checked while computing
    // attesting indices.
    let indexed_attestation = get_indexed_attestation(state, attestation)?;

    // > Verify signature
    validate_indexed_attestation(config, state, &indexed_attestation, verifier)?;

    Ok(attestation_epoch)
}

/// Processes a single deposit. Also used to build genesis states.
///
/// A deposit for a new validator with an invalid proof of possession is consumed without adding
/// the validator.
pub fn process_deposit<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    deposit: &Deposit,
    verifier: impl Verifier,
) -> Result<()> {
    // > Verify the Merkle branch
    verify_deposit_merkle_branch(state, state.eth1_deposit_index, deposit)?;

    // > Deposits must be processed in order
    state.eth1_deposit_index += 1;

    let DepositData {
        pubkey,
        withdrawal_credentials,
        amount,
        signature,
    } = deposit.data;

    if let Some(validator_index) = index_of_public_key(state, pubkey) {
        // > Increase balance by deposit amount
        increase_balance(balance(state, validator_index)?, amount);
        return Ok(());
    }

    // > Verify the deposit signature (proof of possession)
    // > which is not checked by the deposit contract
    let deposit_message = DepositMessage::from(deposit.data);

    if let Err(error) = deposit_message.verify(config, signature, pubkey, verifier) {
        debug!("ignoring deposit for new validator {pubkey:?}: {error}");
        return Ok(());
    }

    // > Add validator and balance entries
    let effective_balance = amount
        .prev_multiple_of(P::EFFECTIVE_BALANCE_INCREMENT)
        .min(P::MAX_EFFECTIVE_BALANCE);

    state.validators.push(Validator {
        pubkey,
        withdrawal_credentials,
        effective_balance,
        slashed: false,
        activation_eligibility_epoch: FAR_FUTURE_EPOCH,
        activation_epoch: FAR_FUTURE_EPOCH,
        exit_epoch: FAR_FUTURE_EPOCH,
        withdrawable_epoch: FAR_FUTURE_EPOCH,
    })?;

    state.balances.push(amount)?;

    Ok(())
}

pub fn verify_deposit_merkle_branch<P: Preset>(
    state: &BeaconState<P>,
    eth1_deposit_index: DepositIndex,
    deposit: &Deposit,
) -> Result<()> {
    ensure!(
        is_valid_merkle_branch(
            deposit.data.hash_tree_root(),
            deposit.proof.iter().copied(),
            eth1_deposit_index,
            state.eth1_data.deposit_root,
        ),
        Error::<P>::DepositProofInvalid {
            deposit: Box::new(deposit.clone()),
        },
    );

    Ok(())
}

fn process_voluntary_exit<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    signed_voluntary_exit: SignedVoluntaryExit,
    verifier: impl Verifier,
) -> Result<()> {
    validate_voluntary_exit(config, state, signed_voluntary_exit, verifier)?;

    // > Initiate exit
    initiate_validator_exit(config, state, signed_voluntary_exit.message.validator_index)
}

pub fn validate_voluntary_exit<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    signed_voluntary_exit: SignedVoluntaryExit,
    verifier: impl Verifier,
) -> Result<()> {
    let voluntary_exit = signed_voluntary_exit.message;
    let index = voluntary_exit.validator_index;
    let validator = state.validators.get(index)?;
    let current_epoch = get_current_epoch(state);

    // > Verify the validator is active
    ensure!(
        is_active_validator(validator, current_epoch),
        Error::<P>::ValidatorNotActive {
            index,
            validator: *validator,
            current_epoch,
        },
    );

    // > Verify exit has not been initiated
    ensure!(
        validator.exit_epoch == FAR_FUTURE_EPOCH,
        Error::<P>::ValidatorAlreadyExited {
            index,
            exit_epoch: validator.exit_epoch,
        },
    );

    // > Exits must specify an epoch when they become valid; they are not valid before then
    ensure!(
        current_epoch >= voluntary_exit.epoch,
        Error::<P>::VoluntaryExitNotYetValid {
            epoch: voluntary_exit.epoch,
            current_epoch,
        },
    );

    // > Verify the validator has been active long enough
    ensure!(
        current_epoch >= validator.activation_epoch + config.shard_committee_period,
        Error::<P>::ValidatorHasNotBeenActiveLongEnough {
            index,
            activation_epoch: validator.activation_epoch,
            current_epoch,
        },
    );

    // > Verify signature
    voluntary_exit.verify(
        config,
        state,
        signed_voluntary_exit.signature,
        validator.pubkey,
        verifier,
    )
}
