use anyhow::Result;
use bls::{PublicKeyBytes, SignatureBytes};
use helper_functions::{
    accessors::get_beacon_proposer_index,
    error::{Error, SignatureKind},
    verifier::Verifier,
};
use ssz::{ContiguousList, SszHash as _};
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        consts::{FAR_FUTURE_EPOCH, GENESIS_EPOCH},
        containers::{BeaconBlock, BeaconBlockBody, Eth1Data, SignedBeaconBlock, Validator},
        primitives::{Slot, ValidatorIndex, H256},
    },
    preset::Preset,
};

use crate::phase0::{compute_new_state_root, process_slots};

pub fn public_key(validator_index: ValidatorIndex) -> PublicKeyBytes {
    PublicKeyBytes::from_low_u64_be(validator_index + 1)
}

/// A state at slot 0 with `validator_count` validators active since genesis.
pub fn genesis_state<P: Preset>(validator_count: u64) -> Result<BeaconState<P>> {
    let validators = (0..validator_count).map(|validator_index| Validator {
        pubkey: public_key(validator_index),
        withdrawal_credentials: H256::zero(),
        effective_balance: P::MAX_EFFECTIVE_BALANCE,
        slashed: false,
        activation_eligibility_epoch: GENESIS_EPOCH,
        activation_epoch: GENESIS_EPOCH,
        exit_epoch: FAR_FUTURE_EPOCH,
        withdrawable_epoch: FAR_FUTURE_EPOCH,
    });

    let balances =
        core::iter::repeat_n(P::MAX_EFFECTIVE_BALANCE, usize::try_from(validator_count)?);

    let mut state = BeaconState::<P> {
        eth1_data: Eth1Data {
            deposit_count: validator_count,
            ..Eth1Data::default()
        },
        eth1_deposit_index: validator_count,
        validators: ContiguousList::try_from_iter(validators)?,
        balances: ContiguousList::try_from_iter(balances)?,
        ..BeaconState::default()
    };

    state.latest_block_header.body_root = BeaconBlockBody::<P>::default().hash_tree_root();
    state.genesis_validators_root = state.validators.hash_tree_root();

    Ok(state)
}

/// A block at `slot` with an empty body and a correct state root.
pub fn empty_block<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    slot: Slot,
) -> Result<SignedBeaconBlock<P>> {
    block_with_body(config, state, slot, BeaconBlockBody {
        eth1_data: state.eth1_data,
        ..BeaconBlockBody::default()
    })
}

pub fn block_with_body<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    slot: Slot,
    body: BeaconBlockBody<P>,
) -> Result<SignedBeaconBlock<P>> {
    let mut advanced = state.clone();

    if advanced.slot < slot {
        process_slots(config, &mut advanced, slot)?;
    }

    let mut block = BeaconBlock {
        slot,
        proposer_index: get_beacon_proposer_index(&advanced)?,
        parent_root: advanced.latest_block_header.hash_tree_root(),
        state_root: H256::zero(),
        body,
    };

    block.state_root = compute_new_state_root(config, &advanced, &block)?;

    Ok(block.with_signature(SignatureBytes::empty()))
}

/// Rejects every signature.
pub struct RejectingVerifier;

impl Verifier for RejectingVerifier {
    const IS_NULL: bool = false;

    fn verify_singular(
        &mut self,
        _message: H256,
        _signature_bytes: SignatureBytes,
        _public_key: PublicKeyBytes,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        Err(Error::SignatureInvalid(signature_kind).into())
    }

    fn verify_aggregate(
        &mut self,
        _message: H256,
        _signature_bytes: SignatureBytes,
        _public_keys: impl IntoIterator<Item = PublicKeyBytes>,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        Err(Error::SignatureInvalid(signature_kind).into())
    }
}
