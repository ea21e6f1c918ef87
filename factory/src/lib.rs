//! Builders for states, blocks and attestations used in tests.
//!
//! Everything built here carries empty signatures and is only valid with `NullVerifier`.

use std::sync::Arc;

use anyhow::{ensure, Result};
use bls::SignatureBytes;
use deposit_tree::DepositTree;
use helper_functions::{
    accessors::{
        self, beacon_committees, get_beacon_proposer_index, get_block_root,
        get_block_root_at_slot, get_committee_assignment, get_current_epoch, latest_block_root,
    },
    misc::{compute_epoch_at_slot, compute_start_slot_at_epoch},
    verifier::NullVerifier,
};
use itertools::Itertools as _;
use ssz::{BitList, ContiguousList, SszHash as _};
use thiserror::Error;
use transition_functions::phase0::{process_block, process_slots};
use types::{
    config::Config,
    nonstandard::AttestationEpoch,
    phase0::{
        beacon_state::BeaconState,
        containers::{
            Attestation, AttestationData, BeaconBlock, BeaconBlockBody, Checkpoint,
            SignedBeaconBlock,
        },
        primitives::{Epoch, Slot, ValidatorIndex, H256},
    },
    preset::Preset,
};

type BlockWithState<P> = (Arc<SignedBeaconBlock<P>>, Arc<BeaconState<P>>);

#[derive(Debug, Error)]
enum Error {
    #[error("cannot build block at slot {slot} on state at slot {state_slot}")]
    SlotNotAfterState { slot: Slot, state_slot: Slot },
    #[error("validator {validator_index} is not in any committee in epoch {epoch}")]
    ValidatorNotInCommittee {
        validator_index: ValidatorIndex,
        epoch: Epoch,
    },
}

/// Genesis state with the minimum number of validators needed to trigger genesis.
pub fn min_genesis_state<P: Preset>(config: &Config) -> Result<(Arc<BeaconState<P>>, DepositTree)> {
    let (genesis_state, deposit_tree) = interop::quick_start_beacon_state(
        config,
        config.min_genesis_time,
        config.min_genesis_active_validator_count,
    )?;

    Ok((Arc::new(genesis_state), deposit_tree))
}

pub fn empty_block<P: Preset>(
    config: &Config,
    pre_state: Arc<BeaconState<P>>,
    slot: Slot,
    graffiti: H256,
) -> Result<BlockWithState<P>> {
    block(config, pre_state, slot, graffiti, [])
}

/// Builds a block at the last slot of `epoch` containing attestations from every committee in
/// the slots before it.
///
/// Committees in all but one slot of the epoch hold more than 2/3 of the stake, so `epoch`
/// becomes justified at the end of it.
pub fn block_justifying_current_epoch<P: Preset>(
    config: &Config,
    pre_state: Arc<BeaconState<P>>,
    epoch: Epoch,
    graffiti: H256,
) -> Result<BlockWithState<P>> {
    let slot = compute_start_slot_at_epoch::<P>(epoch + 1) - 1;
    let state = advance(config, pre_state, slot)?;
    let attestations = full_attestations(&state, compute_start_slot_at_epoch::<P>(epoch)..slot)?;

    block(config, state, slot, graffiti, attestations)
}

/// Builds a block at the first slot of the epoch after `epoch` containing attestations from every
/// committee in `epoch`.
///
/// `epoch` becomes justified at the end of the epoch the block is in.
pub fn block_justifying_previous_epoch<P: Preset>(
    config: &Config,
    pre_state: Arc<BeaconState<P>>,
    epoch: Epoch,
    graffiti: H256,
) -> Result<BlockWithState<P>> {
    let slot = compute_start_slot_at_epoch::<P>(epoch + 1);
    let state = advance(config, pre_state, slot)?;
    let attestations = full_attestations(&state, compute_start_slot_at_epoch::<P>(epoch)..slot)?;

    block(config, state, slot, graffiti, attestations)
}

/// Builds a block in every slot after `pre_state` up to and including the first slot of `epoch`.
///
/// Every block contains attestations from all committees in the slot before it, so epochs get
/// justified and finalized as early as possible.
pub fn full_blocks_up_to_epoch<P: Preset>(
    config: &Config,
    pre_state: Arc<BeaconState<P>>,
    epoch: Epoch,
) -> Result<(Vec<Arc<SignedBeaconBlock<P>>>, Arc<BeaconState<P>>)> {
    let end_slot = compute_start_slot_at_epoch::<P>(epoch);
    let mut state = pre_state;
    let mut blocks = vec![];

    for slot in state.slot + 1..=end_slot {
        let advanced = advance(config, state, slot)?;
        let attestations = full_attestations(&advanced, slot - 1..slot)?;
        let (block, post_state) = block(config, advanced, slot, H256::zero(), attestations)?;

        blocks.push(block);
        state = post_state;
    }

    Ok((blocks, state))
}

/// Builds an attestation by `validator_index` for its assigned slot in `epoch`.
///
/// The attestation votes for the latest block in `state` as the head.
pub fn singular_attestation<P: Preset>(
    state: &BeaconState<P>,
    epoch: Epoch,
    validator_index: ValidatorIndex,
) -> Result<Attestation<P>> {
    let assignment = get_committee_assignment(state, epoch, validator_index)?.ok_or(
        Error::ValidatorNotInCommittee {
            validator_index,
            epoch,
        },
    )?;

    let head_root = latest_block_root(state);
    let epoch_start = compute_start_slot_at_epoch::<P>(epoch);

    let target_root = if epoch_start < state.slot {
        get_block_root_at_slot(state, epoch_start)?
    } else {
        head_root
    };

    let source = if epoch < get_current_epoch(state) {
        state.previous_justified_checkpoint
    } else {
        state.current_justified_checkpoint
    };

    let aggregation_bits = BitList::from_bits(
        assignment
            .committee
            .iter()
            .map(|member| *member == validator_index),
    )?;

    Ok(Attestation {
        aggregation_bits,
        data: AttestationData {
            slot: assignment.slot,
            index: assignment.committee_index,
            beacon_block_root: head_root,
            source,
            target: Checkpoint {
                epoch,
                root: target_root,
            },
        },
        signature: SignatureBytes::empty(),
    })
}

fn block<P: Preset>(
    config: &Config,
    pre_state: Arc<BeaconState<P>>,
    slot: Slot,
    graffiti: H256,
    attestations: impl IntoIterator<Item = Attestation<P>>,
) -> Result<BlockWithState<P>> {
    let mut state = Arc::unwrap_or_clone(advance(config, pre_state, slot)?);

    let body = BeaconBlockBody {
        randao_reveal: SignatureBytes::empty(),
        eth1_data: state.eth1_data,
        graffiti,
        attestations: ContiguousList::try_from_iter(attestations)?,
        ..BeaconBlockBody::default()
    };

    let mut block = BeaconBlock {
        slot,
        proposer_index: get_beacon_proposer_index(&state)?,
        parent_root: latest_block_root(&state),
        state_root: H256::zero(),
        body,
    };

    process_block(config, &mut state, &block, NullVerifier)?;

    block.state_root = state.hash_tree_root();

    let block = block.with_signature(SignatureBytes::empty());

    Ok((Arc::new(block), Arc::new(state)))
}

fn advance<P: Preset>(
    config: &Config,
    state: Arc<BeaconState<P>>,
    slot: Slot,
) -> Result<Arc<BeaconState<P>>> {
    let state_slot = state.slot;

    ensure!(
        state_slot <= slot,
        Error::SlotNotAfterState { slot, state_slot },
    );

    if state_slot == slot {
        return Ok(state);
    }

    let mut state = Arc::unwrap_or_clone(state);
    process_slots(config, &mut state, slot)?;
    Ok(Arc::new(state))
}

// `state` must be past every slot in `slots`.
fn full_attestations<P: Preset>(
    state: &BeaconState<P>,
    slots: core::ops::Range<Slot>,
) -> Result<Vec<Attestation<P>>> {
    let current_epoch = get_current_epoch(state);

    slots
        .map(|slot| {
            let epoch = compute_epoch_at_slot::<P>(slot);

            let (attestation_epoch, source) = if epoch == current_epoch {
                (AttestationEpoch::Current, state.current_justified_checkpoint)
            } else {
                (AttestationEpoch::Previous, state.previous_justified_checkpoint)
            };

            let data = AttestationData {
                slot,
                index: 0,
                beacon_block_root: get_block_root_at_slot(state, slot)?,
                source,
                target: Checkpoint {
                    epoch,
                    root: get_block_root(state, attestation_epoch)?,
                },
            };

            let attestations = beacon_committees(state, slot)?
                .into_iter()
                .zip(0..)
                .map(|(committee, index)| {
                    Ok(Attestation {
                        aggregation_bits: BitList::from_bits(committee.iter().map(|_| true))?,
                        data: AttestationData { index, ..data },
                        signature: SignatureBytes::empty(),
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(attestations)
        })
        .flatten_ok()
        .collect()
}

#[cfg(test)]
mod tests {
    use types::preset::Minimal;

    use super::*;

    #[test]
    fn empty_block_applies_to_pre_state() -> Result<()> {
        let config = Minimal::default_config();
        let (genesis_state, _) = min_genesis_state::<Minimal>(&config)?;

        let (block, state) = empty_block(&config, genesis_state.clone(), 3, H256::zero())?;

        assert_eq!(block.message.slot, 3);
        assert_eq!(block.message.parent_root, latest_block_root(&genesis_state));
        assert_eq!(block.message.state_root, state.hash_tree_root());
        assert_eq!(state.slot, 3);

        Ok(())
    }

    #[test]
    fn block_justifying_current_epoch_justifies_it() -> Result<()> {
        let config = Minimal::default_config();
        let (genesis_state, _) = min_genesis_state::<Minimal>(&config)?;

        let (block, state) =
            block_justifying_current_epoch(&config, genesis_state, 2, H256::zero())?;

        assert_eq!(block.message.slot, 23);
        // 7 slots with 2 committees each.
        assert_eq!(block.message.body.attestations.len(), 14);

        let mut state = Arc::unwrap_or_clone(state);

        process_slots(&config, &mut state, 24)?;

        assert_eq!(state.current_justified_checkpoint.epoch, 2);

        Ok(())
    }

    #[test]
    fn block_justifying_previous_epoch_justifies_it() -> Result<()> {
        let config = Minimal::default_config();
        let (genesis_state, _) = min_genesis_state::<Minimal>(&config)?;

        let (_, state) = block_justifying_previous_epoch(&config, genesis_state, 2, H256::zero())?;

        let mut state = Arc::unwrap_or_clone(state);

        process_slots(&config, &mut state, 32)?;

        assert_eq!(state.current_justified_checkpoint.epoch, 2);

        Ok(())
    }

    #[test]
    fn full_blocks_finalize_epochs() -> Result<()> {
        let config = Minimal::default_config();
        let (genesis_state, _) = min_genesis_state::<Minimal>(&config)?;

        let (blocks, state) = full_blocks_up_to_epoch(&config, genesis_state, 4)?;

        assert_eq!(blocks.len(), 32);
        assert_eq!(state.slot, 32);
        assert_eq!(state.current_justified_checkpoint.epoch, 3);
        assert_eq!(state.finalized_checkpoint.epoch, 2);

        for (parent, child) in blocks.iter().tuple_windows() {
            assert_eq!(child.message.parent_root, parent.message.hash_tree_root());
        }

        Ok(())
    }

    #[test]
    fn singular_attestation_has_one_bit_set() -> Result<()> {
        let config = Minimal::default_config();
        let (genesis_state, _) = min_genesis_state::<Minimal>(&config)?;

        let attestation = singular_attestation(&genesis_state, 0, 5)?;
        let attesting_indices = accessors::get_attesting_indices(
            &genesis_state,
            attestation.data,
            &attestation.aggregation_bits,
        )?;

        assert_eq!(attesting_indices, [5]);
        assert_eq!(
            attestation.data.beacon_block_root,
            latest_block_root(&genesis_state),
        );

        Ok(())
    }
}
