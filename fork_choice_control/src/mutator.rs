// `Mutator` owns the objects that could not be processed yet.
// It never publishes anything itself. `Controller` hands it a private copy of the store and
// publishes the copy once the `Mutator` is done with it.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use anyhow::Result;
use fork_choice_store::{MissingReference, Store, ValidationOutcome};
use helper_functions::verifier::Verifier;
use log::{debug, warn};
use ssz::SszHash as _;
use types::{
    phase0::{
        containers::{Attestation, SignedBeaconBlock},
        primitives::{Slot, UnixSeconds, H256},
    },
    preset::Preset,
};

use crate::misc::{Delayed, PendingObject};

pub struct Mutator<P: Preset, V> {
    verifier: V,
    delayed_until_block: HashMap<H256, Delayed<P>>,
    delayed_until_slot: BTreeMap<Slot, Delayed<P>>,
}

impl<P: Preset, V: Verifier> Mutator<P, V> {
    pub fn new(verifier: V) -> Self {
        Self {
            verifier,
            delayed_until_block: HashMap::new(),
            delayed_until_slot: BTreeMap::new(),
        }
    }

    pub fn delayed_object_count(&self) -> usize {
        self.delayed_until_block
            .values()
            .chain(self.delayed_until_slot.values())
            .map(Delayed::len)
            .sum()
    }

    pub fn handle_tick(&mut self, store: &mut Store<P>, time: UnixSeconds) -> Result<()> {
        store.on_tick(time)?;

        let current_slot = store.current_slot();
        let mut ready = Delayed::default();

        for delayed in self.take_delayed_until_slot(current_slot) {
            ready.extend(delayed);
        }

        if !ready.is_empty() {
            debug!(
                "retrying {} objects delayed until slot {current_slot} or earlier",
                ready.len(),
            );

            self.retry_delayed(store, ready);
        }

        Ok(())
    }

    pub fn handle_block(
        &mut self,
        store: &mut Store<P>,
        block: Arc<SignedBeaconBlock<P>>,
    ) -> ValidationOutcome {
        let block_root = block.message.hash_tree_root();
        let slot = block.message.slot;
        let old_finalized_checkpoint = store.finalized_checkpoint();
        let outcome = store.on_block(block.clone(), &mut self.verifier);

        match &outcome {
            ValidationOutcome::Accepted => {
                if let Some(delayed) = self.take_delayed_until_block(block_root) {
                    debug!(
                        "retrying {} objects delayed until block {block_root:?}",
                        delayed.len(),
                    );

                    self.retry_delayed(store, delayed);
                }

                if store.finalized_checkpoint() != old_finalized_checkpoint {
                    self.prune_delayed_until_block(store);
                }
            }
            ValidationOutcome::NotYetValid(missing) => {
                self.delay(*missing, PendingObject::Block(block));
            }
            ValidationOutcome::InvalidForever(error) => {
                warn!("block rejected (block_root: {block_root:?}, slot: {slot}): {error}");
            }
        }

        outcome
    }

    pub fn handle_attestation(
        &mut self,
        store: &mut Store<P>,
        attestation: Arc<Attestation<P>>,
    ) -> ValidationOutcome {
        let outcome = store.on_attestation(attestation.clone(), &mut self.verifier);

        match &outcome {
            ValidationOutcome::Accepted => {}
            ValidationOutcome::NotYetValid(missing) => {
                self.delay(*missing, PendingObject::Attestation(attestation));
            }
            ValidationOutcome::InvalidForever(error) => {
                warn!(
                    "attestation rejected (slot: {}, index: {}): {error}",
                    attestation.data.slot, attestation.data.index,
                );
            }
        }

        outcome
    }

    fn delay(&mut self, missing: MissingReference, object: PendingObject<P>) {
        let delayed = match missing {
            MissingReference::Block(block_root) => {
                self.delayed_until_block.entry(block_root).or_default()
            }
            MissingReference::Slot(slot) => self.delayed_until_slot.entry(slot).or_default(),
        };

        object.add_to(delayed);
    }

    fn take_delayed_until_block(&mut self, block_root: H256) -> Option<Delayed<P>> {
        self.delayed_until_block.remove(&block_root)
    }

    fn take_delayed_until_slot(&mut self, slot: Slot) -> impl Iterator<Item = Delayed<P>> {
        match slot.checked_add(1) {
            Some(next_slot) => {
                let later = self.delayed_until_slot.split_off(&next_slot);
                core::mem::replace(&mut self.delayed_until_slot, later)
            }
            None => core::mem::take(&mut self.delayed_until_slot),
        }
        .into_values()
    }

    // Objects delayed until a pruned block are not pruned transitively.
    // They stay until their own parent or target falls behind finalization.
    fn prune_delayed_until_block(&mut self, store: &Store<P>) {
        let finalized_slot = store.finalized_slot();
        let previous_epoch = store.previous_epoch();
        let old_count = self.delayed_object_count();

        self.delayed_until_block.retain(|_, delayed| {
            let Delayed {
                blocks,
                attestations,
            } = delayed;

            // The parent of a delayed block cannot be in a finalized slot.
            blocks.retain(|block| finalized_slot < block.message.slot.saturating_sub(1));
            attestations.retain(|attestation| previous_epoch <= attestation.data.target.epoch);

            !delayed.is_empty()
        });

        let pruned = old_count - self.delayed_object_count();

        if pruned > 0 {
            debug!("pruned {pruned} delayed objects (finalized slot: {finalized_slot})");
        }
    }

    // Blocks go first because the attestations may vote for them.
    fn retry_delayed(&mut self, store: &mut Store<P>, delayed: Delayed<P>) {
        let Delayed {
            blocks,
            attestations,
        } = delayed;

        for block in blocks {
            self.handle_block(store, block);
        }

        for attestation in attestations {
            self.handle_attestation(store, attestation);
        }
    }
}
