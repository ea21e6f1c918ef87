use core::num::NonZeroU64;

use anyhow::{ensure, Result};
use arithmetic::U64Ext as _;
use bls::SignatureBytes;
use deposit_tree::DepositTree;
use helper_functions::{
    accessors,
    verifier::{NullVerifier, Verifier},
};
use log::debug;
use ssz::{ContiguousVector, SszHash as _};
use thiserror::Error;
use transition_functions::phase0;
use types::{
    config::Config,
    nonstandard::ErrorKind,
    phase0::{
        beacon_state::BeaconState,
        consts::{GENESIS_EPOCH, GENESIS_SLOT},
        containers::{
            BeaconBlock, BeaconBlockBody, BeaconBlockHeader, Deposit, DepositData, Fork,
            SignedBeaconBlock,
        },
        primitives::{DepositIndex, UnixSeconds, H256},
    },
    preset::Preset,
};

/// Builds a genesis state one deposit at a time.
///
/// The deposit root in `BeaconState.eth1_data` is updated after every deposit, so proofs
/// in deposits must be against the tree containing only the deposits up to and including them.
pub struct Incremental<'config, P: Preset, V = NullVerifier> {
    config: &'config Config,
    beacon_state: BeaconState<P>,
    deposit_tree: DepositTree,
    verifier: V,
}

impl<'config, P: Preset> Incremental<'config, P> {
    #[must_use]
    pub fn new(config: &'config Config) -> Self {
        Self::with_verifier(config, NullVerifier)
    }
}

impl<'config, P: Preset, V: Verifier> Incremental<'config, P, V> {
    /// <https://github.com/ethereum/consensus-specs/blob/v0.12.1/specs/phase0/beacon-chain.md#genesis>
    #[must_use]
    pub fn with_verifier(config: &'config Config, verifier: V) -> Self {
        let fork = Fork {
            previous_version: config.genesis_fork_version,
            current_version: config.genesis_fork_version,
            epoch: GENESIS_EPOCH,
        };

        let latest_block_header = BeaconBlockHeader {
            slot: GENESIS_SLOT,
            body_root: BeaconBlockBody::<P>::default().hash_tree_root(),
            ..BeaconBlockHeader::default()
        };

        let beacon_state = BeaconState {
            slot: GENESIS_SLOT,
            fork,
            latest_block_header,
            ..BeaconState::default()
        };

        Self {
            config,
            beacon_state,
            deposit_tree: DepositTree::default(),
            verifier,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_genesis_state(self.config, &self.beacon_state)
    }

    pub fn set_eth1_timestamp(&mut self, eth1_timestamp: UnixSeconds) {
        self.beacon_state.genesis_time = genesis_time(self.config, eth1_timestamp);
    }

    /// Processes a deposit whose proof was produced elsewhere.
    ///
    /// Nothing is changed if the deposit is rejected.
    pub fn add_deposit(&mut self, deposit: &Deposit) -> Result<()> {
        let deposit_index = self.deposit_tree.deposit_count();
        let mut deposit_tree = self.deposit_tree;
        let deposit_root = deposit_tree.push_and_compute_root(deposit_index, deposit.data)?;

        self.process_deposit(deposit_tree, deposit_root, deposit)
    }

    /// Processes a deposit with a proof taken from the internal deposit tree.
    ///
    /// Nothing is changed if the deposit is rejected.
    pub fn add_deposit_data(&mut self, data: DepositData, deposit_index: DepositIndex) -> Result<()> {
        let mut deposit_tree = self.deposit_tree;
        let deposit_root = deposit_tree.push_and_compute_root(deposit_index, data)?;

        let deposit = Deposit {
            proof: ContiguousVector::try_from(deposit_tree.latest_proof())?,
            data,
        };

        self.process_deposit(deposit_tree, deposit_root, &deposit)
    }

    pub fn finish(self, eth1_block_hash: H256) -> Result<(BeaconState<P>, DepositTree)> {
        let Self {
            mut beacon_state,
            deposit_tree,
            ..
        } = self;

        beacon_state.eth1_data.block_hash = eth1_block_hash;

        // > Seed RANDAO with Eth1 entropy
        beacon_state.randao_mixes = ContiguousVector::repeat_element(eth1_block_hash);

        // > Process activations
        for (validator, balance) in beacon_state
            .validators
            .iter_mut()
            .zip(beacon_state.balances.iter().copied())
        {
            validator.effective_balance = balance
                .prev_multiple_of(P::EFFECTIVE_BALANCE_INCREMENT)
                .min(P::MAX_EFFECTIVE_BALANCE);

            if validator.effective_balance == P::MAX_EFFECTIVE_BALANCE {
                validator.activation_eligibility_epoch = GENESIS_EPOCH;
                validator.activation_epoch = GENESIS_EPOCH;
            }
        }

        // > Set genesis validators root for domain separation and chain versioning
        beacon_state.genesis_validators_root = beacon_state.validators.hash_tree_root();

        debug!(
            "finished genesis state (validators: {}, genesis_time: {})",
            beacon_state.validators.len(),
            beacon_state.genesis_time,
        );

        Ok((beacon_state, deposit_tree))
    }

    // `deposit_tree` already contains `deposit`.
    // The proof is checked before `process_deposit` changes anything other than `eth1_data`.
    fn process_deposit(
        &mut self,
        deposit_tree: DepositTree,
        deposit_root: H256,
        deposit: &Deposit,
    ) -> Result<()> {
        let old_eth1_data = self.beacon_state.eth1_data;

        self.beacon_state.eth1_data.deposit_root = deposit_root;
        self.beacon_state.eth1_data.deposit_count = deposit_tree.deposit_count();

        let result = phase0::process_deposit(
            self.config,
            &mut self.beacon_state,
            deposit,
            &mut self.verifier,
        );

        if result.is_ok() {
            self.deposit_tree = deposit_tree;
        } else {
            self.beacon_state.eth1_data = old_eth1_data;
        }

        result
    }
}

/// <https://github.com/ethereum/consensus-specs/blob/v0.12.1/specs/phase0/beacon-chain.md#genesis>
pub fn initialize_beacon_state_from_eth1<'deposits, P: Preset>(
    config: &Config,
    eth1_block_hash: H256,
    eth1_timestamp: UnixSeconds,
    deposits: impl IntoIterator<Item = &'deposits Deposit>,
) -> Result<BeaconState<P>> {
    let mut incremental = Incremental::new(config);

    incremental.set_eth1_timestamp(eth1_timestamp);

    for deposit in deposits {
        incremental.add_deposit(deposit)?;
    }

    let (beacon_state, _) = incremental.finish(eth1_block_hash)?;

    Ok(beacon_state)
}

#[must_use]
pub fn genesis_time(config: &Config, eth1_timestamp: UnixSeconds) -> UnixSeconds {
    let delay = config.genesis_delay;

    // A zero delay means genesis immediately follows the Eth1 block.
    match eth1_timestamp.checked_rem(delay) {
        Some(remainder) => eth1_timestamp - remainder + 2 * delay,
        None => eth1_timestamp,
    }
}

#[derive(Debug, Error)]
pub enum GenesisTriggerError {
    #[error("too early ({actual_genesis_time} < {minimum_genesis_time})")]
    TooEarly {
        minimum_genesis_time: UnixSeconds,
        actual_genesis_time: UnixSeconds,
    },
    #[error("not enough active validators ({actual_validator_count} < {minimum_validator_count})")]
    NotEnoughActiveValidators {
        minimum_validator_count: NonZeroU64,
        actual_validator_count: u64,
    },
}

impl GenesisTriggerError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::TooEarly { .. } => ErrorKind::TemporalViolation,
            Self::NotEnoughActiveValidators { .. } => ErrorKind::PreconditionViolation,
        }
    }
}

/// <https://github.com/ethereum/consensus-specs/blob/v0.12.1/specs/phase0/beacon-chain.md#genesis-block>
#[must_use]
pub fn beacon_block<P: Preset>(genesis_state: &BeaconState<P>) -> SignedBeaconBlock<P> {
    // Note that `BeaconBlock.body.eth1_data` is not set to `genesis_state.eth1_data`.
    BeaconBlock {
        state_root: genesis_state.hash_tree_root(),
        ..BeaconBlock::default()
    }
    .with_signature(SignatureBytes::zero())
}

#[must_use]
pub fn is_valid_genesis_state<P: Preset>(config: &Config, state: &BeaconState<P>) -> bool {
    validate_genesis_state(config, state).is_ok()
}

/// <https://github.com/ethereum/consensus-specs/blob/v0.12.1/specs/phase0/beacon-chain.md#genesis-state>
pub fn validate_genesis_state<P: Preset>(config: &Config, state: &BeaconState<P>) -> Result<()> {
    let minimum_genesis_time = config.min_genesis_time;
    let actual_genesis_time = state.genesis_time;

    ensure!(
        minimum_genesis_time <= actual_genesis_time,
        GenesisTriggerError::TooEarly {
            minimum_genesis_time,
            actual_genesis_time,
        },
    );

    let minimum_validator_count = config.min_genesis_active_validator_count;
    let actual_validator_count =
        accessors::get_active_validator_indices(state, GENESIS_EPOCH).count().try_into()?;

    ensure!(
        minimum_validator_count.get() <= actual_validator_count,
        GenesisTriggerError::NotEnoughActiveValidators {
            minimum_validator_count,
            actual_validator_count,
        },
    );

    Ok(())
}
