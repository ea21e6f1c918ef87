//! Deterministic validators and genesis states for coordinated test starts.
//!
//! Public keys are derived from validator indices by hashing. They are not valid curve points,
//! so states built here are only usable with verifiers that do not check signatures.

use core::num::NonZeroU64;

use anyhow::Result;
use bls::{PublicKeyBytes, SignatureBytes};
use deposit_tree::DepositTree;
use genesis::Incremental;
use helper_functions::misc;
use ssz::SszHash as _;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        containers::DepositData,
        primitives::{UnixSeconds, ValidatorIndex, H256},
    },
    preset::Preset,
};

/// <https://github.com/ethereum/eth2.0-pm/tree/b7c76e7a9d036ce73ca6aa0b7065db92f7728f41/interop/mocked_start#create-genesis-state>
pub const QUICK_START_ETH1_BLOCK_HASH: H256 = H256([0x42; 32]);

/// <https://github.com/ethereum/eth2.0-pm/tree/b7c76e7a9d036ce73ca6aa0b7065db92f7728f41/interop/mocked_start#create-genesis-state>
///
/// The genesis time derived from this is replaced by the one passed to
/// [`quick_start_beacon_state`].
const QUICK_START_ETH1_BLOCK_TIMESTAMP: UnixSeconds = 1 << 40;

/// Builds a genesis state with `validator_count` validators, all active at genesis.
pub fn quick_start_beacon_state<P: Preset>(
    config: &Config,
    genesis_time: UnixSeconds,
    validator_count: NonZeroU64,
) -> Result<(BeaconState<P>, DepositTree)> {
    let mut incremental = Incremental::new(config);

    incremental.set_eth1_timestamp(QUICK_START_ETH1_BLOCK_TIMESTAMP);

    for index in 0..validator_count.get() {
        incremental.add_deposit_data(quick_start_deposit_data::<P>(index), index)?;
    }

    // > Clients must not run is_valid_genesis_state as this state is already considered valid.
    // > Specifically, we do not check nor care about MIN_GENESIS_TIME in these coordinated starts.

    let (mut genesis_state, deposit_tree) = incremental.finish(QUICK_START_ETH1_BLOCK_HASH)?;

    genesis_state.genesis_time = genesis_time;

    Ok((genesis_state, deposit_tree))
}

/// The public key of the validator with index `validator_index`.
///
/// The first 32 bytes are the hash of the index. The rest are taken from the hash of those.
#[must_use]
pub fn public_key(validator_index: ValidatorIndex) -> PublicKeyBytes {
    let index_hash = hashing::hash_256(validator_index.hash_tree_root());
    let tail_hash = hashing::hash_256(index_hash);

    let mut public_key = PublicKeyBytes::zero();
    let (head, tail) = public_key.as_mut().split_at_mut(H256::len_bytes());

    head.copy_from_slice(index_hash.as_bytes());
    tail.copy_from_slice(&tail_hash[..tail.len()]);

    public_key
}

/// <https://github.com/ethereum/eth2.0-pm/tree/b7c76e7a9d036ce73ca6aa0b7065db92f7728f41/interop/mocked_start#generate-deposits>
///
/// The signature is left empty.
#[must_use]
pub fn quick_start_deposit_data<P: Preset>(validator_index: ValidatorIndex) -> DepositData {
    let pubkey = public_key(validator_index);

    DepositData {
        pubkey,
        withdrawal_credentials: misc::bls_withdrawal_credentials(pubkey),
        amount: P::MAX_EFFECTIVE_BALANCE,
        signature: SignatureBytes::empty(),
    }
}
