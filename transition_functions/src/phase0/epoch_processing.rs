use core::ops::Mul as _;

use anyhow::Result;
use arithmetic::{NonZeroExt as _, U64Ext};
use helper_functions::{
    accessors::{
        absolute_epoch, get_block_root, get_current_epoch, get_next_epoch, get_randao_mix,
        get_total_active_balance, get_validator_churn_limit,
    },
    misc::compute_activation_exit_epoch,
    mutators::{decrease_balance, increase_balance, initiate_validator_exit},
    predicates::{
        is_active_validator, is_eligible_for_activation, is_eligible_for_activation_queue,
    },
};
use itertools::Itertools as _;
use log::debug;
use ssz::{ContiguousList, SszHash as _};
use typenum::Unsigned as _;
use types::{
    config::Config,
    nonstandard::AttestationEpoch,
    phase0::{
        beacon_state::BeaconState,
        consts::GENESIS_EPOCH,
        containers::{Checkpoint, HistoricalBatch},
        primitives::Gwei,
    },
    preset::Preset,
};

use super::epoch_intermediates::{self, EpochDeltas, Statistics, ValidatorSummary};

pub fn process_epoch<P: Preset>(config: &Config, state: &mut BeaconState<P>) -> Result<()> {
    let (statistics, mut summaries, performance) = epoch_intermediates::statistics(state)?;

    process_justification_and_finalization(state, statistics)?;

    // Epoch deltas must be computed after `process_justification_and_finalization`
    // because they depend on the updated value of `BeaconState.finalized_checkpoint`.
    if should_process_rewards_and_penalties(state) {
        let epoch_deltas = epoch_intermediates::epoch_deltas(
            state,
            statistics,
            summaries.iter().copied(),
            performance,
        )?;

        process_rewards_and_penalties(state, epoch_deltas);
    }

    process_registry_updates(config, state, summaries.as_mut_slice())?;
    process_slashings(state, summaries);
    process_final_updates(state)?;

    debug!(
        "processed epoch {} (justified: {:?}, finalized: {:?})",
        get_current_epoch(state),
        state.current_justified_checkpoint,
        state.finalized_checkpoint,
    );

    Ok(())
}

pub fn process_justification_and_finalization<P: Preset>(
    state: &mut BeaconState<P>,
    statistics: Statistics,
) -> Result<()> {
    if !should_process_justification_and_finalization(state) {
        return Ok(());
    }

    weigh_justification_and_finalization(
        state,
        statistics.current_epoch_active_balance,
        statistics.previous_epoch_target_attesting_balance,
        statistics.current_epoch_target_attesting_balance,
    )
}

pub fn weigh_justification_and_finalization<P: Preset>(
    state: &mut BeaconState<P>,
    current_epoch_active_balance: Gwei,
    previous_epoch_target_balance: Gwei,
    current_epoch_target_balance: Gwei,
) -> Result<()> {
    let old_previous_justified_checkpoint = state.previous_justified_checkpoint;
    let old_current_justified_checkpoint = state.current_justified_checkpoint;

    // > Process justifications
    state.previous_justified_checkpoint = state.current_justified_checkpoint;
    state.justification_bits.shift_up(1);

    for (attestation_epoch, bit, target_balance) in [
        (AttestationEpoch::Previous, 1, previous_epoch_target_balance),
        (AttestationEpoch::Current, 0, current_epoch_target_balance),
    ] {
        if target_balance * 3 >= current_epoch_active_balance * 2 {
            state.current_justified_checkpoint = Checkpoint {
                epoch: absolute_epoch(state, attestation_epoch.into()),
                root: get_block_root(state, attestation_epoch)?,
            };

            state.justification_bits.set(bit, true);
        }
    }

    // > Process finalizations
    let bits = &state.justification_bits;
    let current_epoch = get_current_epoch(state);
    let all_set = |range: core::ops::Range<usize>| bits[range].all();

    let mut finalized_checkpoint = state.finalized_checkpoint;

    // > The 2nd/3rd/4th most recent epochs are justified, the 2nd using the 4th as source
    if all_set(1..4) && old_previous_justified_checkpoint.epoch + 3 == current_epoch {
        finalized_checkpoint = old_previous_justified_checkpoint;
    }

    // > The 2nd/3rd most recent epochs are justified, the 2nd using the 3rd as source
    if all_set(1..3) && old_previous_justified_checkpoint.epoch + 2 == current_epoch {
        finalized_checkpoint = old_previous_justified_checkpoint;
    }

    // > The 1st/2nd/3rd most recent epochs are justified, the 1st using the 3rd as source
    if all_set(0..3) && old_current_justified_checkpoint.epoch + 2 == current_epoch {
        finalized_checkpoint = old_current_justified_checkpoint;
    }

    // > The 1st/2nd most recent epochs are justified, the 1st using the 2nd as source
    if all_set(0..2) && old_current_justified_checkpoint.epoch + 1 == current_epoch {
        finalized_checkpoint = old_current_justified_checkpoint;
    }

    state.finalized_checkpoint = finalized_checkpoint;

    Ok(())
}

pub fn process_rewards_and_penalties<P: Preset>(
    state: &mut BeaconState<P>,
    deltas: impl IntoIterator<Item = EpochDeltas>,
) {
    for (balance, deltas) in state.balances.iter_mut().zip(deltas) {
        increase_balance(balance, deltas.combined_reward());
        decrease_balance(balance, deltas.combined_penalty());
    }
}

pub fn process_registry_updates<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    summaries: &mut [ValidatorSummary],
) -> Result<()> {
    let current_epoch = get_current_epoch(state);
    let next_epoch = get_next_epoch(state);

    // The indices collected in these do not overlap.
    let mut eligible_for_activation_queue = vec![];
    let mut ejections = vec![];
    let mut activation_queue = vec![];

    for (validator, validator_index) in state.validators.iter().zip(0..) {
        if is_eligible_for_activation_queue::<P>(validator) {
            eligible_for_activation_queue.push(validator_index);
        }

        if is_active_validator(validator, current_epoch)
            && validator.effective_balance <= config.ejection_balance
        {
            ejections.push(validator_index);
        }

        if is_eligible_for_activation(state, validator) {
            activation_queue.push((validator_index, validator.activation_eligibility_epoch));
        }
    }

    // > Process activation eligibility and ejections
    for validator_index in eligible_for_activation_queue {
        state
            .validators
            .get_mut(validator_index)?
            .activation_eligibility_epoch = next_epoch;
    }

    for validator_index in ejections {
        let index = usize::try_from(validator_index)?;

        initiate_validator_exit(config, state, validator_index)?;

        // `process_slashings` depends on `Validator.withdrawable_epoch`,
        // which may have been modified by `initiate_validator_exit`.
        summaries[index].update_from(state.validators.get(validator_index)?);
    }

    // > Queue validators eligible for activation and not yet dequeued for activation
    // > Order by the sequence of activation_eligibility_epoch setting and then index
    let activation_queue = activation_queue
        .into_iter()
        .sorted_unstable_by_key(|&(validator_index, activation_eligibility_epoch)| {
            (activation_eligibility_epoch, validator_index)
        })
        .map(|(validator_index, _)| validator_index);

    // > Dequeued validators for activation up to churn limit
    let churn_limit = usize::try_from(get_validator_churn_limit(config, state))?;
    let activation_exit_epoch = compute_activation_exit_epoch::<P>(current_epoch);

    for validator_index in activation_queue.take(churn_limit) {
        state.validators.get_mut(validator_index)?.activation_epoch = activation_exit_epoch;
    }

    Ok(())
}

pub fn process_slashings<P: Preset>(
    state: &mut BeaconState<P>,
    summaries: impl IntoIterator<Item = ValidatorSummary>,
) {
    let current_epoch = get_current_epoch(state);
    let total_active_balance = get_total_active_balance(state);

    let adjusted_total_slashing_balance = state
        .slashings
        .iter()
        .sum::<Gwei>()
        .mul(P::PROPORTIONAL_SLASHING_MULTIPLIER)
        .min(total_active_balance);

    for (balance, summary) in state.balances.iter_mut().zip(summaries) {
        let ValidatorSummary {
            effective_balance,
            slashed,
            withdrawable_epoch,
            ..
        } = summary;

        if !slashed || current_epoch + P::EpochsPerSlashingsVector::U64 / 2 != withdrawable_epoch {
            continue;
        }

        // > Factored out from penalty numerator to avoid uint64 overflow
        let increment = P::EFFECTIVE_BALANCE_INCREMENT;
        let penalty_numerator = effective_balance / increment * adjusted_total_slashing_balance;
        let penalty = penalty_numerator / total_active_balance * increment.get();

        decrease_balance(balance, penalty);
    }
}

pub fn process_final_updates<P: Preset>(state: &mut BeaconState<P>) -> Result<()> {
    process_eth1_data_reset(state);
    process_effective_balance_updates(state);
    process_slashings_reset(state);
    process_randao_mixes_reset(state);
    process_historical_roots_update(state)?;
    process_participation_record_updates(state);

    Ok(())
}

fn process_eth1_data_reset<P: Preset>(state: &mut BeaconState<P>) {
    let next_epoch = get_next_epoch(state);

    // > Reset eth1 data votes
    if U64Ext::is_multiple_of(next_epoch, P::EpochsPerEth1VotingPeriod::non_zero()) {
        state.eth1_data_votes = ContiguousList::default();
    }
}

fn process_effective_balance_updates<P: Preset>(state: &mut BeaconState<P>) {
    let hysteresis_increment = P::EFFECTIVE_BALANCE_INCREMENT.get() / P::HYSTERESIS_QUOTIENT;
    let downward_threshold = hysteresis_increment * P::HYSTERESIS_DOWNWARD_MULTIPLIER;
    let upward_threshold = hysteresis_increment * P::HYSTERESIS_UPWARD_MULTIPLIER;

    // > Update effective balances with hysteresis
    for (validator, balance) in state.validators.iter_mut().zip(state.balances.iter().copied()) {
        let below = balance + downward_threshold < validator.effective_balance;
        let above = validator.effective_balance + upward_threshold < balance;

        if below || above {
            validator.effective_balance = balance
                .prev_multiple_of(P::EFFECTIVE_BALANCE_INCREMENT)
                .min(P::MAX_EFFECTIVE_BALANCE);
        }
    }
}

fn process_slashings_reset<P: Preset>(state: &mut BeaconState<P>) {
    let next_epoch = get_next_epoch(state);

    // > Reset slashings
    *state.slashings.mod_index_mut(next_epoch) = 0;
}

fn process_randao_mixes_reset<P: Preset>(state: &mut BeaconState<P>) {
    let current_epoch = get_current_epoch(state);
    let next_epoch = get_next_epoch(state);

    // > Set randao mix
    *state.randao_mixes.mod_index_mut(next_epoch) = get_randao_mix(state, current_epoch);
}

fn process_historical_roots_update<P: Preset>(state: &mut BeaconState<P>) -> Result<()> {
    let next_epoch = get_next_epoch(state);

    // > Set historical root accumulator
    if U64Ext::is_multiple_of(next_epoch, P::EpochsPerHistoricalRoot::non_zero()) {
        let historical_batch = HistoricalBatch::<P> {
            block_roots: state.block_roots.clone(),
            state_roots: state.state_roots.clone(),
        };

        state
            .historical_roots
            .push(historical_batch.hash_tree_root())?;
    }

    Ok(())
}

fn process_participation_record_updates<P: Preset>(state: &mut BeaconState<P>) {
    // > Rotate current/previous epoch attestations
    state.previous_epoch_attestations = core::mem::take(&mut state.current_epoch_attestations);
}

fn should_process_justification_and_finalization<P: Preset>(state: &BeaconState<P>) -> bool {
    // > Initial FFG checkpoint values have a `0x00` stub for `root`.
    // > Skip FFG updates in the first two epochs to avoid
    // > corner cases that might result in modifying this stub.
    GENESIS_EPOCH + 1 < get_current_epoch(state)
}

fn should_process_rewards_and_penalties<P: Preset>(state: &BeaconState<P>) -> bool {
    // > No rewards are applied at the end of `GENESIS_EPOCH`
    // > because rewards are for work done in the previous epoch
    GENESIS_EPOCH < get_current_epoch(state)
}

#[cfg(test)]
mod tests {
    use helper_functions::accessors::{base_reward, total_balance_sqrt};
    use ssz::BitVector;
    use test_case::test_case;
    use types::{
        phase0::{consts::FAR_FUTURE_EPOCH, primitives::{Epoch, H256}},
        preset::Minimal,
    };

    use crate::test_utils;

    use super::*;

    const VALIDATOR_COUNT: u64 = 64;

    fn state_at_last_slot_of(epoch: Epoch) -> Result<BeaconState<Minimal>> {
        let mut state = test_utils::genesis_state::<Minimal>(VALIDATOR_COUNT)?;
        state.slot = (epoch + 1) * <Minimal as Preset>::SlotsPerEpoch::U64 - 1;
        Ok(state)
    }

    fn checkpoint(epoch: Epoch) -> Checkpoint {
        Checkpoint {
            epoch,
            root: H256::repeat_byte(u8::try_from(epoch).unwrap_or(u8::MAX)),
        }
    }

    #[test_case([true, true, true, false], 7, 5, false => 7; "2nd to 4th justified with 4th as source")]
    #[test_case([true, true, false, false], 8, 5, false => 8; "2nd and 3rd justified with 3rd as source")]
    #[test_case([true, true, false, false], 5, 8, true => 8; "1st to 3rd justified with 3rd as source")]
    #[test_case([true, false, false, false], 5, 9, true => 9; "1st and 2nd justified with 2nd as source")]
    #[test_case([true, true, true, false], 6, 8, false => 0; "justified checkpoints too old")]
    #[test_case([false, false, false, false], 9, 9, false => 0; "nothing justified")]
    fn finality_rule_fires_on_its_pattern(
        bits_before: [bool; 4],
        previous_justified_epoch: Epoch,
        current_justified_epoch: Epoch,
        justify_current_epoch: bool,
    ) -> Epoch {
        let mut state = state_at_last_slot_of(10).expect("state can be constructed");

        state.justification_bits =
            BitVector::from_bits(bits_before).expect("length matches JUSTIFICATION_BITS_LENGTH");
        state.previous_justified_checkpoint = checkpoint(previous_justified_epoch);
        state.current_justified_checkpoint = checkpoint(current_justified_epoch);

        let active_balance = VALIDATOR_COUNT * Minimal::MAX_EFFECTIVE_BALANCE;
        let current_target_balance = if justify_current_epoch { active_balance } else { 0 };

        weigh_justification_and_finalization(&mut state, active_balance, 0, current_target_balance)
            .expect("block roots for both epochs are available");

        assert_eq!(
            state.previous_justified_checkpoint,
            checkpoint(current_justified_epoch),
        );

        if justify_current_epoch {
            assert_eq!(state.current_justified_checkpoint.epoch, 10);
            assert!(state.justification_bits[0]);
        }

        // The root identifies which checkpoint was finalized.
        if state.finalized_checkpoint.epoch != 0 {
            assert_eq!(
                state.finalized_checkpoint,
                checkpoint(state.finalized_checkpoint.epoch),
            );
        }

        state.finalized_checkpoint.epoch
    }

    #[test]
    fn two_thirds_of_previous_epoch_justifies_it() -> Result<()> {
        let mut state = state_at_last_slot_of(10)?;
        let active_balance = 3_000;

        weigh_justification_and_finalization(&mut state, active_balance, 1_999, 0)?;

        assert_eq!(state.current_justified_checkpoint.epoch, 0);

        weigh_justification_and_finalization(&mut state, active_balance, 2_000, 0)?;

        assert_eq!(state.current_justified_checkpoint.epoch, 9);
        assert!(state.justification_bits[1]);
        assert!(!state.justification_bits[0]);

        Ok(())
    }

    #[test]
    fn epoch_without_attestations_penalizes_every_validator() -> Result<()> {
        let state = state_at_last_slot_of(2)?;
        let (statistics, summaries, performance) = epoch_intermediates::statistics(&state)?;
        let deltas = epoch_intermediates::epoch_deltas(&state, statistics, summaries, performance)?;

        let total_balance = VALIDATOR_COUNT * Minimal::MAX_EFFECTIVE_BALANCE;
        let base_reward =
            base_reward::<Minimal>(Minimal::MAX_EFFECTIVE_BALANCE, total_balance_sqrt(total_balance)?);

        assert_eq!(deltas.len(), state.validators.len());

        for deltas in deltas {
            assert_eq!(deltas.combined_reward(), 0);
            assert_eq!(deltas.combined_penalty(), 3 * base_reward);
        }

        Ok(())
    }

    #[test]
    fn inactivity_leak_adds_canceling_and_inactivity_penalties() -> Result<()> {
        let state = state_at_last_slot_of(6)?;
        let (statistics, summaries, performance) = epoch_intermediates::statistics(&state)?;
        let deltas = epoch_intermediates::epoch_deltas(&state, statistics, summaries, performance)?;

        let effective_balance = Minimal::MAX_EFFECTIVE_BALANCE;
        let total_balance = VALIDATOR_COUNT * effective_balance;
        let base_reward =
            base_reward::<Minimal>(effective_balance, total_balance_sqrt(total_balance)?);
        let proposer_reward = base_reward / Minimal::PROPOSER_REWARD_QUOTIENT;
        let finality_delay = 5;

        let expected = EpochDeltas {
            source_penalty: base_reward,
            target_penalty: base_reward,
            head_penalty: base_reward,
            canceling_penalty: 4 * base_reward - proposer_reward,
            inactivity_penalty: effective_balance * finality_delay
                / Minimal::INACTIVITY_PENALTY_QUOTIENT,
            ..EpochDeltas::default()
        };

        assert!(deltas.into_iter().all(|deltas| deltas == expected));

        Ok(())
    }

    #[test]
    fn slashed_validator_is_penalized_halfway_to_withdrawal() -> Result<()> {
        let mut state = test_utils::genesis_state::<Minimal>(VALIDATOR_COUNT)?;
        let halfway = <Minimal as Preset>::EpochsPerSlashingsVector::U64 / 2;

        for (validator_index, withdrawable_epoch) in [(0, halfway), (1, halfway + 1)] {
            let validator = state.validators.get_mut(validator_index)?;
            validator.slashed = true;
            validator.withdrawable_epoch = withdrawable_epoch;
        }

        *state.slashings.mod_index_mut(0) = Minimal::MAX_EFFECTIVE_BALANCE;

        let (_, summaries, _) = epoch_intermediates::statistics(&state)?;

        process_slashings(&mut state, summaries);

        // 32 increments * min(3 * 32 ETH, 2048 ETH) / 2048 ETH rounds down to 1 increment.
        assert_eq!(*state.balances.get(0)?, Minimal::MAX_EFFECTIVE_BALANCE - 1_000_000_000);
        assert_eq!(*state.balances.get(1)?, Minimal::MAX_EFFECTIVE_BALANCE);

        Ok(())
    }

    #[test]
    fn registry_updates_eject_and_activate_within_churn() -> Result<()> {
        let config = Config {
            min_per_epoch_churn_limit: 1,
            ..Minimal::default_config()
        };

        let mut state = test_utils::genesis_state::<Minimal>(VALIDATOR_COUNT)?;
        state.slot = 2 * <Minimal as Preset>::SlotsPerEpoch::U64;
        state.finalized_checkpoint.epoch = 1;

        // Validator 60 has just been deposited. 61-63 wait in the activation queue.
        for (validator_index, activation_eligibility_epoch) in [
            (60, FAR_FUTURE_EPOCH),
            (61, 1),
            (62, 0),
            (63, 0),
        ] {
            let validator = state.validators.get_mut(validator_index)?;
            validator.activation_eligibility_epoch = activation_eligibility_epoch;
            validator.activation_epoch = FAR_FUTURE_EPOCH;
        }

        state.validators.get_mut(3)?.effective_balance = config.ejection_balance;

        let (_, mut summaries, _) = epoch_intermediates::statistics(&state)?;

        process_registry_updates(&config, &mut state, &mut summaries)?;

        let activation_exit_epoch = compute_activation_exit_epoch::<Minimal>(2);

        assert_eq!(state.validators.get(60)?.activation_eligibility_epoch, 3);
        assert_eq!(state.validators.get(62)?.activation_epoch, activation_exit_epoch);
        assert_eq!(state.validators.get(61)?.activation_epoch, FAR_FUTURE_EPOCH);
        assert_eq!(state.validators.get(63)?.activation_epoch, FAR_FUTURE_EPOCH);

        let ejected = state.validators.get(3)?;

        assert_eq!(ejected.exit_epoch, activation_exit_epoch);
        assert_eq!(summaries[3].withdrawable_epoch, ejected.withdrawable_epoch);

        Ok(())
    }

    #[test_case(31_700_000_000 => 31_000_000_000; "drops below downward threshold")]
    #[test_case(31_800_000_000 => 32_000_000_000; "stays within hysteresis")]
    #[test_case(40_000_000_000 => 32_000_000_000; "capped at maximum")]
    fn effective_balance_follows_balance_with_hysteresis(balance: Gwei) -> Gwei {
        let mut state =
            test_utils::genesis_state::<Minimal>(1).expect("state can be constructed");

        *state.balances.get_mut(0).expect("validator 0 exists") = balance;

        process_final_updates(&mut state).expect("final updates succeed");

        state
            .validators
            .get(0)
            .expect("validator 0 exists")
            .effective_balance
    }

    #[test]
    fn final_updates_rotate_pending_attestations() -> Result<()> {
        let mut state = test_utils::genesis_state::<Minimal>(VALIDATOR_COUNT)?;

        state.current_epoch_attestations.push(Default::default())?;

        process_final_updates(&mut state)?;

        assert_eq!(state.previous_epoch_attestations.len(), 1);
        assert!(state.current_epoch_attestations.is_empty());

        Ok(())
    }
}
