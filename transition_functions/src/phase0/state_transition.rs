use anyhow::{ensure, Result};
use helper_functions::{signing::SignForSingleFork as _, verifier::NullVerifier, verifier::Verifier};
use ssz::SszHash as _;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        containers::{BeaconBlock, SignedBeaconBlock},
        primitives::H256,
    },
    preset::Preset,
};

use super::{block_processing, slot_processing, ProcessSlots};
use crate::Error;

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub enum StateRootPolicy {
    #[default]
    Verify,
    Trust,
}

impl StateRootPolicy {
    pub fn verify<P: Preset>(self, state: &BeaconState<P>, block: &BeaconBlock<P>) -> Result<()> {
        match self {
            Self::Verify => {
                let computed = state.hash_tree_root();
                let in_block = block.state_root;

                ensure!(
                    computed == in_block,
                    Error::<P>::StateRootMismatch { computed, in_block },
                );
            }
            Self::Trust => {}
        }

        Ok(())
    }
}

/// Applies `signed_block` to `state`.
///
/// On failure `state` may be left partially updated. Callers that need atomicity apply blocks
/// to a copy.
pub fn state_transition<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    signed_block: &SignedBeaconBlock<P>,
    process_slots: ProcessSlots,
    state_root_policy: StateRootPolicy,
    mut verifier: impl Verifier,
) -> Result<()> {
    let block = &signed_block.message;

    // > Process slots (including those with no blocks) since block
    if process_slots.should_process(state, block) {
        slot_processing::process_slots(config, state, block.slot)?;
    }

    // > Verify signature
    verify_block_signature(config, state, signed_block, &mut verifier)?;

    // > Process block
    block_processing::process_block(config, state, block, verifier)?;

    // > Verify state root
    state_root_policy.verify(state, block)
}

pub fn verify_block_signature<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    signed_block: &SignedBeaconBlock<P>,
    verifier: impl Verifier,
) -> Result<()> {
    let block = &signed_block.message;
    let public_key = state.validators.get(block.proposer_index)?.pubkey;

    block.verify(config, state, signed_block.signature, public_key, verifier)
}

/// Computes the state root a block producer should put in `block`.
///
/// `state` is left untouched. Signatures are not checked.
pub fn compute_new_state_root<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    block: &BeaconBlock<P>,
) -> Result<H256> {
    let mut state = state.clone();

    if state.slot < block.slot {
        slot_processing::process_slots(config, &mut state, block.slot)?;
    }

    block_processing::process_block(config, &mut state, block, NullVerifier)?;

    Ok(state.hash_tree_root())
}
