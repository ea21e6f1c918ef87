// Writers are serialized by `Controller.mutator`. Each writer works on its own copy of the latest
// snapshot and publishes the copy when done, so readers never wait and never see a half-applied
// object. Copying a `Store` is cheap because all of its collections are persistent.

use std::sync::Arc;

use anyhow::Result;
use arc_swap::ArcSwap;
use fork_choice_store::{Store, StoreConfig, ValidationOutcome};
use helper_functions::verifier::{NullVerifier, Verifier};
use parking_lot::Mutex;
use thiserror::Error;
use types::{
    config::Config as ChainConfig,
    phase0::{
        beacon_state::BeaconState,
        containers::{Attestation, SignedBeaconBlock},
        primitives::{UnixSeconds, H256},
    },
    preset::Preset,
};

use crate::mutator::Mutator;

pub struct Controller<P: Preset, V = NullVerifier> {
    // The latest consistent snapshot of the store.
    store_snapshot: ArcSwap<Store<P>>,
    mutator: Mutex<Mutator<P, V>>,
}

impl<P: Preset> Controller<P> {
    /// Creates a [`Controller`] that does not verify signatures.
    #[must_use]
    pub fn new(
        chain_config: Arc<ChainConfig>,
        store_config: StoreConfig,
        anchor_state: Arc<BeaconState<P>>,
    ) -> Self {
        Self::with_verifier(chain_config, store_config, anchor_state, NullVerifier)
    }
}

impl<P: Preset, V: Verifier> Controller<P, V> {
    #[must_use]
    pub fn with_verifier(
        chain_config: Arc<ChainConfig>,
        store_config: StoreConfig,
        anchor_state: Arc<BeaconState<P>>,
        verifier: V,
    ) -> Self {
        let store = Store::new(chain_config, store_config, anchor_state);

        Self {
            store_snapshot: ArcSwap::from_pointee(store),
            mutator: Mutex::new(Mutator::new(verifier)),
        }
    }

    /// The latest published state of the store.
    ///
    /// The snapshot is not affected by objects submitted after it was taken.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Store<P>> {
        self.store_snapshot.load_full()
    }

    pub fn head(&self) -> Result<H256> {
        self.snapshot().get_head()
    }

    pub fn head_state(&self) -> Result<Arc<BeaconState<P>>> {
        let snapshot = self.snapshot();
        let head = snapshot.get_head()?;

        let state = snapshot
            .block_state(head)
            .ok_or(Error::HeadStateMissing { head })?;

        Ok(state.clone())
    }

    /// Number of objects waiting for a block or a slot.
    #[must_use]
    pub fn delayed_object_count(&self) -> usize {
        self.mutator.lock().delayed_object_count()
    }

    /// Advances the store clock and retries objects that were waiting for the new slot.
    ///
    /// Nothing is published if the store fails to process the tick.
    pub fn on_tick(&self, time: UnixSeconds) -> Result<()> {
        let mut mutator = self.mutator.lock();
        let mut store = self.store_copy();

        mutator.handle_tick(&mut store, time)?;

        self.store_snapshot.store(Arc::new(store));

        Ok(())
    }

    /// Processes `block` and everything that was waiting for it.
    ///
    /// Returns the outcome for `block` alone.
    /// [`ValidationOutcome::NotYetValid`] objects are kept and retried later.
    pub fn on_block(&self, block: Arc<SignedBeaconBlock<P>>) -> ValidationOutcome {
        let mut mutator = self.mutator.lock();
        let mut store = self.store_copy();

        let outcome = mutator.handle_block(&mut store, block);

        self.store_snapshot.store(Arc::new(store));

        outcome
    }

    pub fn on_attestation(&self, attestation: Arc<Attestation<P>>) -> ValidationOutcome {
        let mut mutator = self.mutator.lock();
        let mut store = self.store_copy();

        let outcome = mutator.handle_attestation(&mut store, attestation);

        self.store_snapshot.store(Arc::new(store));

        outcome
    }

    fn store_copy(&self) -> Store<P> {
        Store::clone(&self.store_snapshot.load())
    }
}

#[derive(Debug, Error)]
enum Error {
    #[error("state of head block is missing (head: {head:?})")]
    HeadStateMissing { head: H256 },
}

#[cfg(test)]
mod tests {
    use fork_choice_store::{LatestMessage, MissingReference};
    use helper_functions::accessors::get_committee_assignment;
    use log::Level;
    use ssz::SszHash as _;
    use test_case::test_case;
    use types::{phase0::primitives::Slot, preset::Minimal};

    use super::*;

    fn genesis_controller() -> Result<(Controller<Minimal>, Arc<BeaconState<Minimal>>)> {
        let config = Arc::new(Minimal::default_config());
        let (genesis_state, _) = factory::min_genesis_state::<Minimal>(&config)?;
        let controller = Controller::new(config, StoreConfig::default(), genesis_state.clone());

        Ok((controller, genesis_state))
    }

    fn tick_to_slot(controller: &Controller<Minimal>, slot: Slot) -> Result<()> {
        let snapshot = controller.snapshot();
        let config = snapshot.chain_config();

        // `factory::min_genesis_state` starts the chain at `MIN_GENESIS_TIME`.
        controller.on_tick(config.min_genesis_time + config.seconds_per_slot.get() * slot)
    }

    #[test]
    fn child_is_retried_when_parent_arrives() -> Result<()> {
        testing_logger::setup();

        let (controller, genesis_state) = genesis_controller()?;
        let config = controller.snapshot().chain_config().clone();

        let (block_1, state_1) = factory::empty_block(&config, genesis_state, 1, H256::zero())?;
        let (block_2, _) = factory::empty_block(&config, state_1, 2, H256::zero())?;

        tick_to_slot(&controller, 2)?;

        let outcome = controller.on_block(block_2.clone());

        assert!(matches!(
            outcome,
            ValidationOutcome::NotYetValid(MissingReference::Block(_)),
        ));
        assert_eq!(controller.delayed_object_count(), 1);

        assert!(controller.on_block(block_1).is_accepted());
        assert_eq!(controller.delayed_object_count(), 0);
        assert_eq!(controller.head()?, block_2.message.hash_tree_root());
        assert_eq!(controller.head_state()?.slot, 2);

        testing_logger::validate(|logs| {
            assert!(logs.iter().any(|log| {
                log.level == Level::Debug
                    && log.target.starts_with("fork_choice_control")
                    && log.body.starts_with("retrying 1 objects delayed until block")
            }));
        });

        Ok(())
    }

    #[test_case(2, 1; "one slot early")]
    #[test_case(3, 0; "exactly on time")]
    #[test_case(5, 0; "late")]
    fn future_block_is_retried_on_tick(tick_slot: Slot, still_delayed: usize) -> Result<()> {
        let (controller, genesis_state) = genesis_controller()?;
        let config = controller.snapshot().chain_config().clone();
        let (block, _) = factory::empty_block(&config, genesis_state, 3, H256::zero())?;

        let outcome = controller.on_block(block.clone());

        assert!(matches!(
            outcome,
            ValidationOutcome::NotYetValid(MissingReference::Slot(3)),
        ));

        tick_to_slot(&controller, tick_slot)?;

        let block_root = block.message.hash_tree_root();

        assert_eq!(controller.delayed_object_count(), still_delayed);
        assert_eq!(
            controller.snapshot().contains_block(block_root),
            still_delayed == 0,
        );

        Ok(())
    }

    #[test]
    fn invalid_block_is_dropped_with_warning() -> Result<()> {
        testing_logger::setup();

        let (controller, genesis_state) = genesis_controller()?;
        let config = controller.snapshot().chain_config().clone();
        let (block, _) = factory::empty_block(&config, genesis_state, 1, H256::zero())?;

        let mut block = Arc::unwrap_or_clone(block);
        block.message.state_root = H256::repeat_byte(1);

        tick_to_slot(&controller, 1)?;

        let outcome = controller.on_block(Arc::new(block));

        assert!(matches!(outcome, ValidationOutcome::InvalidForever(_)));
        assert_eq!(controller.delayed_object_count(), 0);

        testing_logger::validate(|logs| {
            let warnings = logs
                .iter()
                .filter(|log| log.level == Level::Warn)
                .collect::<Vec<_>>();

            assert_eq!(warnings.len(), 1);
            assert!(warnings[0].body.starts_with("block rejected"));
        });

        Ok(())
    }

    #[test]
    fn snapshots_are_isolated_from_later_writes() -> Result<()> {
        let (controller, genesis_state) = genesis_controller()?;
        let config = controller.snapshot().chain_config().clone();
        let (block, _) = factory::empty_block(&config, genesis_state, 1, H256::zero())?;
        let block_root = block.message.hash_tree_root();

        tick_to_slot(&controller, 1)?;

        let before = controller.snapshot();

        assert!(controller.on_block(block).is_accepted());

        assert!(!before.contains_block(block_root));
        assert!(controller.snapshot().contains_block(block_root));
        assert_ne!(before.get_head()?, controller.head()?);

        Ok(())
    }

    #[test]
    fn readers_see_head_advance_monotonically() -> Result<()> {
        let (controller, genesis_state) = genesis_controller()?;
        let config = controller.snapshot().chain_config().clone();
        let (blocks, _) = factory::full_blocks_up_to_epoch(&config, genesis_state, 2)?;

        std::thread::scope(|scope| -> Result<()> {
            let reader = scope.spawn(|| -> Result<()> {
                let mut head_slot = 0;

                while head_slot < 16 {
                    let snapshot = controller.snapshot();
                    let head = snapshot.get_head()?;
                    let slot = snapshot.chain_link(head).map_or(0, |link| link.slot());

                    assert!(head_slot <= slot);

                    head_slot = slot;
                }

                Ok(())
            });

            for block in &blocks {
                tick_to_slot(&controller, block.message.slot)?;
                assert!(controller.on_block(block.clone()).is_accepted());
            }

            reader.join().expect("reader thread should not panic")
        })?;

        assert_eq!(controller.head()?, blocks[blocks.len() - 1].message.hash_tree_root());

        Ok(())
    }

    #[test]
    fn attestation_waiting_for_slot_is_applied_on_tick() -> Result<()> {
        let (controller, genesis_state) = genesis_controller()?;
        let config = controller.snapshot().chain_config().clone();
        let (block, state) = factory::empty_block(&config, genesis_state, 1, H256::zero())?;
        let block_root = block.message.hash_tree_root();

        tick_to_slot(&controller, 1)?;

        assert!(controller.on_block(block).is_accepted());

        let validator_index = (0..64)
            .find(|validator_index| {
                get_committee_assignment(&state, 0, *validator_index)
                    .ok()
                    .flatten()
                    .is_some_and(|assignment| assignment.slot >= 1)
            })
            .expect("some validator should attest after slot 0");

        let attestation = Arc::new(factory::singular_attestation(&state, 0, validator_index)?);
        let outcome = controller.on_attestation(attestation);

        assert!(matches!(
            outcome,
            ValidationOutcome::NotYetValid(MissingReference::Slot(_)),
        ));
        assert_eq!(controller.snapshot().latest_message(validator_index), None);

        tick_to_slot(&controller, 8)?;

        assert_eq!(controller.delayed_object_count(), 0);
        assert_eq!(
            controller.snapshot().latest_message(validator_index),
            Some(LatestMessage {
                epoch: 0,
                root: block_root,
            }),
        );

        Ok(())
    }

    #[test]
    fn orphans_are_dropped_when_finalization_passes_them() -> Result<()> {
        let (controller, genesis_state) = genesis_controller()?;
        let config = controller.snapshot().chain_config().clone();
        let unknown_root = H256::repeat_byte(0xab);

        let orphan = |slot| -> Result<Arc<SignedBeaconBlock<Minimal>>> {
            let (block, _) =
                factory::empty_block(&config, genesis_state.clone(), slot, H256::zero())?;

            let mut block = Arc::unwrap_or_clone(block);
            block.message.parent_root = unknown_root;

            Ok(Arc::new(block))
        };

        let (_, side_state) =
            factory::empty_block(&config, genesis_state.clone(), 1, H256::repeat_byte(7))?;
        let vote_for_unknown_block = Arc::new(factory::singular_attestation(&side_state, 0, 0)?);

        assert!(matches!(
            controller.on_block(orphan(1)?),
            ValidationOutcome::NotYetValid(MissingReference::Block(root)) if root == unknown_root,
        ));
        assert!(matches!(
            controller.on_block(orphan(30)?),
            ValidationOutcome::NotYetValid(MissingReference::Block(root)) if root == unknown_root,
        ));
        assert!(matches!(
            controller.on_attestation(vote_for_unknown_block),
            ValidationOutcome::NotYetValid(MissingReference::Block(_)),
        ));
        assert_eq!(controller.delayed_object_count(), 3);

        let (blocks, _) = factory::full_blocks_up_to_epoch(&config, genesis_state, 4)?;

        for block in &blocks {
            tick_to_slot(&controller, block.message.slot)?;
            assert!(controller.on_block(block.clone()).is_accepted());
        }

        // Only the orphan after the finalized slot may still get a parent.
        assert_eq!(controller.snapshot().finalized_checkpoint().epoch, 2);
        assert_eq!(controller.delayed_object_count(), 1);

        Ok(())
    }
}
