//! The phase0 state transition function.
//!
//! Everything here operates on a `BeaconState` owned by the caller. Nothing is cached between
//! calls other than the shuffling cache carried by the state itself.

pub use error::Error;

pub mod phase0 {
    pub use block_processing::{
        process_block, process_block_header, process_deposit, process_eth1_data, process_randao,
        validate_attestation, validate_attester_slashing, validate_proposer_slashing,
        validate_voluntary_exit, verify_deposit_merkle_branch,
    };
    pub use epoch_intermediates::{
        epoch_deltas, statistics, EpochDeltas, Inclusion, Performance, Statistics,
        ValidatorSummary,
    };
    pub use epoch_processing::{
        process_epoch, process_final_updates, process_justification_and_finalization,
        process_registry_updates, process_rewards_and_penalties, process_slashings,
        weigh_justification_and_finalization,
    };
    pub use slot_processing::{process_slot, process_slots, ProcessSlots};
    pub use state_transition::{
        compute_new_state_root, state_transition, verify_block_signature, StateRootPolicy,
    };

    mod block_processing;
    mod epoch_intermediates;
    mod epoch_processing;
    mod slot_processing;
    mod state_transition;
}

mod error;

#[cfg(test)]
mod test_utils;
