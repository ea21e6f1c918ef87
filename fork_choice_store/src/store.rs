use std::{collections::HashSet, sync::Arc};

use anyhow::{ensure, Result};
use helper_functions::{
    accessors::{get_active_validator_indices, get_current_epoch, get_indexed_attestation},
    misc::{compute_epoch_at_slot, compute_start_slot_at_epoch, slots_since_epoch_start},
    predicates::validate_indexed_attestation,
    verifier::Verifier,
};
use im::{HashMap, Vector};
use log::{debug, info};
use ssz::SszHash as _;
use transition_functions::phase0::{process_slots, state_transition, ProcessSlots};
use types::{
    cache::Cache,
    config::Config as ChainConfig,
    phase0::{
        beacon_state::BeaconState,
        consts::{GENESIS_EPOCH, GENESIS_SLOT},
        containers::{Attestation, AttestationData, Checkpoint, SignedBeaconBlock},
        primitives::{Epoch, Gwei, Slot, UnixSeconds, ValidatorIndex, H256},
    },
    preset::Preset,
};

use crate::{
    error::Error,
    misc::{
        AttestationAction, BlockAction, ChainLink, LatestMessage, MissingReference,
        ValidationOutcome,
    },
    store_config::StoreConfig,
};

/// [`Store`] from Beacon Chain Fork Choice.
///
/// Cloning is cheap. All collections are persistent and share structure with the original.
///
/// [`Store`]: https://github.com/ethereum/consensus-specs/blob/v0.12.1/specs/phase0/fork-choice.md#store
#[derive(Clone)]
pub struct Store<P: Preset> {
    chain_config: Arc<ChainConfig>,
    store_config: StoreConfig,
    time: UnixSeconds,
    genesis_time: UnixSeconds,
    justified_checkpoint: Checkpoint,
    finalized_checkpoint: Checkpoint,
    best_justified_checkpoint: Checkpoint,
    // `Store.blocks` and `Store.block_states` in one map.
    chain_links: HashMap<H256, ChainLink<P>>,
    children: HashMap<H256, Vector<H256>>,
    checkpoint_states: HashMap<Checkpoint, Arc<BeaconState<P>>>,
    latest_messages: HashMap<ValidatorIndex, LatestMessage>,
}

impl<P: Preset> Store<P> {
    /// [`get_forkchoice_store`](https://github.com/ethereum/consensus-specs/blob/v0.12.1/specs/phase0/fork-choice.md#get_forkchoice_store)
    #[must_use]
    pub fn new(
        chain_config: Arc<ChainConfig>,
        store_config: StoreConfig,
        anchor_state: Arc<BeaconState<P>>,
    ) -> Self {
        let cache = Cache::with_capacity(store_config.shuffling_cache_capacity);
        let anchor_state = Arc::new(Arc::unwrap_or_clone(anchor_state).with_cache(cache));

        let mut header = anchor_state.latest_block_header;

        if header.state_root.is_zero() {
            header.state_root = anchor_state.hash_tree_root();
        }

        let block_root = header.hash_tree_root();

        let checkpoint = Checkpoint {
            epoch: get_current_epoch(&anchor_state),
            root: block_root,
        };

        let anchor = ChainLink {
            block_root,
            header,
            block: None,
            state: anchor_state.clone(),
        };

        let time = anchor_state.genesis_time
            + chain_config.seconds_per_slot.get() * anchor_state.slot;

        Self {
            chain_config,
            store_config,
            time,
            genesis_time: anchor_state.genesis_time,
            justified_checkpoint: checkpoint,
            finalized_checkpoint: checkpoint,
            best_justified_checkpoint: checkpoint,
            chain_links: HashMap::unit(block_root, anchor),
            children: HashMap::new(),
            checkpoint_states: HashMap::unit(checkpoint, anchor_state),
            latest_messages: HashMap::new(),
        }
    }

    #[must_use]
    pub fn chain_config(&self) -> &ChainConfig {
        &self.chain_config
    }

    #[must_use]
    pub const fn store_config(&self) -> StoreConfig {
        self.store_config
    }

    #[must_use]
    pub const fn time(&self) -> UnixSeconds {
        self.time
    }

    /// [`get_current_slot`](https://github.com/ethereum/consensus-specs/blob/v0.12.1/specs/phase0/fork-choice.md#get_current_slot)
    #[must_use]
    pub fn current_slot(&self) -> Slot {
        self.slot_at(self.time)
    }

    #[must_use]
    pub fn current_epoch(&self) -> Epoch {
        compute_epoch_at_slot::<P>(self.current_slot())
    }

    #[must_use]
    pub fn previous_epoch(&self) -> Epoch {
        self.current_epoch().saturating_sub(1).max(GENESIS_EPOCH)
    }

    #[must_use]
    pub const fn justified_checkpoint(&self) -> Checkpoint {
        self.justified_checkpoint
    }

    #[must_use]
    pub const fn finalized_checkpoint(&self) -> Checkpoint {
        self.finalized_checkpoint
    }

    #[must_use]
    pub const fn best_justified_checkpoint(&self) -> Checkpoint {
        self.best_justified_checkpoint
    }

    #[must_use]
    pub fn finalized_slot(&self) -> Slot {
        compute_start_slot_at_epoch::<P>(self.finalized_checkpoint.epoch)
    }

    #[must_use]
    pub fn contains_block(&self, block_root: H256) -> bool {
        self.chain_links.contains_key(&block_root)
    }

    #[must_use]
    pub fn chain_link(&self, block_root: H256) -> Option<&ChainLink<P>> {
        self.chain_links.get(&block_root)
    }

    /// Returns `None` for unknown blocks and for the anchor, whose body is not known.
    #[must_use]
    pub fn block(&self, block_root: H256) -> Option<&Arc<SignedBeaconBlock<P>>> {
        self.chain_link(block_root)?.block.as_ref()
    }

    #[must_use]
    pub fn block_state(&self, block_root: H256) -> Option<&Arc<BeaconState<P>>> {
        self.chain_link(block_root).map(|chain_link| &chain_link.state)
    }

    #[must_use]
    pub fn checkpoint_state(&self, checkpoint: Checkpoint) -> Option<&Arc<BeaconState<P>>> {
        self.checkpoint_states.get(&checkpoint)
    }

    #[must_use]
    pub fn latest_message(&self, validator_index: ValidatorIndex) -> Option<LatestMessage> {
        self.latest_messages.get(&validator_index).copied()
    }

    /// [`get_ancestor`](https://github.com/ethereum/consensus-specs/blob/v0.12.1/specs/phase0/fork-choice.md#get_ancestor)
    ///
    /// Returns the root of the latest block at or before `slot` in the chain ending with
    /// `block_root`. If there is no block exactly at `slot`, the nearest earlier one is returned.
    /// Returns `None` if the chain leaves the store before reaching `slot`.
    #[must_use]
    pub fn get_ancestor(&self, block_root: H256, slot: Slot) -> Option<H256> {
        let mut root = block_root;

        loop {
            let chain_link = self.chain_links.get(&root)?;

            if chain_link.slot() <= slot {
                return Some(root);
            }

            root = chain_link.parent_root();
        }
    }

    /// [`get_head`](https://github.com/ethereum/consensus-specs/blob/v0.12.1/specs/phase0/fork-choice.md#get_head)
    pub fn get_head(&self) -> Result<H256> {
        // > Get filtered block tree that only includes viable branches
        let viable = self.filter_block_tree(self.justified_checkpoint.root);

        let justified_state = self.checkpoint_state_or_compute(self.justified_checkpoint)?;
        let justified_slot = compute_start_slot_at_epoch::<P>(self.justified_checkpoint.epoch);
        let balances = self.latest_attesting_balances(&justified_state, justified_slot)?;

        // > Execute the LMD-GHOST fork choice
        let mut head = self.justified_checkpoint.root;

        loop {
            let best_child = self
                .children_of(head)
                .filter(|child| viable.contains(child))
                .filter(|child| {
                    self.chain_links
                        .get(child)
                        .is_some_and(|chain_link| chain_link.slot() > justified_slot)
                })
                // > Sort by latest attesting balance with ties broken lexicographically
                .max_by_key(|child| (balances.get(child).copied().unwrap_or_default(), *child));

            match best_child {
                Some(child) => head = child,
                None => return Ok(head),
            }
        }
    }

    /// [`on_tick`](https://github.com/ethereum/consensus-specs/blob/v0.12.1/specs/phase0/fork-choice.md#on_tick)
    ///
    /// Times not later than the current one are ignored.
    /// The store is left unchanged if the new justified checkpoint state cannot be computed.
    pub fn on_tick(&mut self, time: UnixSeconds) -> Result<()> {
        if time <= self.time {
            return Ok(());
        }

        let previous_slot = self.current_slot();
        let current_slot = self.slot_at(time);

        let new_epoch =
            compute_epoch_at_slot::<P>(previous_slot) < compute_epoch_at_slot::<P>(current_slot);

        // > Update store.justified_checkpoint if a better checkpoint is known
        if new_epoch && self.best_justified_checkpoint.epoch > self.justified_checkpoint.epoch {
            let checkpoint = self.best_justified_checkpoint;
            let state = self.checkpoint_state_or_compute(checkpoint)?;

            self.time = time;
            self.justified_checkpoint = checkpoint;
            self.checkpoint_states.insert(checkpoint, state);

            info!(
                "justified checkpoint updated at epoch boundary \
                 (checkpoint: {checkpoint:?}, slot: {current_slot})",
            );

            return Ok(());
        }

        // > update store time
        self.time = time;

        Ok(())
    }

    /// [`on_block`](https://github.com/ethereum/consensus-specs/blob/v0.12.1/specs/phase0/fork-choice.md#on_block)
    ///
    /// The post-state is computed on a copy. The store is only modified if the block is accepted.
    pub fn on_block(
        &mut self,
        block: Arc<SignedBeaconBlock<P>>,
        verifier: impl Verifier,
    ) -> ValidationOutcome {
        match self.validate_block(&block, verifier) {
            Ok(BlockAction::Accept(chain_link)) => {
                self.apply_block(chain_link);
                ValidationOutcome::Accepted
            }
            Ok(BlockAction::Ignore) => ValidationOutcome::Accepted,
            Ok(BlockAction::DelayUntilParent(parent_root)) => {
                debug!(
                    "block delayed until parent is known (slot: {}, parent_root: {parent_root:?})",
                    block.message.slot,
                );

                ValidationOutcome::NotYetValid(MissingReference::Block(parent_root))
            }
            Ok(BlockAction::DelayUntilSlot(slot)) => {
                debug!("block delayed until slot {slot} (current slot: {})", self.current_slot());
                ValidationOutcome::NotYetValid(MissingReference::Slot(slot))
            }
            Err(error) => {
                debug!("block rejected (slot: {}): {error}", block.message.slot);
                ValidationOutcome::InvalidForever(error)
            }
        }
    }

    /// [`on_attestation`](https://github.com/ethereum/consensus-specs/blob/v0.12.1/specs/phase0/fork-choice.md#on_attestation)
    pub fn on_attestation(
        &mut self,
        attestation: Arc<Attestation<P>>,
        verifier: impl Verifier,
    ) -> ValidationOutcome {
        match self.validate_attestation(&attestation, verifier) {
            Ok(AttestationAction::Accept {
                target_state,
                attesting_indices,
            }) => {
                self.apply_attestation(attestation.data, target_state, attesting_indices);
                ValidationOutcome::Accepted
            }
            Ok(AttestationAction::DelayUntilBlock(block_root)) => {
                debug!(
                    "attestation delayed until block is known \
                     (slot: {}, block_root: {block_root:?})",
                    attestation.data.slot,
                );

                ValidationOutcome::NotYetValid(MissingReference::Block(block_root))
            }
            Ok(AttestationAction::DelayUntilSlot(slot)) => {
                debug!(
                    "attestation delayed until slot {slot} (attestation slot: {})",
                    attestation.data.slot,
                );

                ValidationOutcome::NotYetValid(MissingReference::Slot(slot))
            }
            Err(error) => {
                debug!("attestation rejected (slot: {}): {error}", attestation.data.slot);
                ValidationOutcome::InvalidForever(error)
            }
        }
    }

    fn validate_block(
        &self,
        block: &Arc<SignedBeaconBlock<P>>,
        verifier: impl Verifier,
    ) -> Result<BlockAction<P>> {
        let block_root = block.message.hash_tree_root();
        let slot = block.message.slot;
        let parent_root = block.message.parent_root;

        // Blocks that are already known would produce the same post-state.
        if self.contains_block(block_root) {
            return Ok(BlockAction::Ignore);
        }

        let Some(parent) = self.chain_links.get(&parent_root) else {
            return Ok(BlockAction::DelayUntilParent(parent_root));
        };

        // > Blocks cannot be in the future.
        // > If they are, their consideration must be delayed until the are in the past.
        if self.current_slot() < slot {
            return Ok(BlockAction::DelayUntilSlot(slot));
        }

        // > Check that block is later than the finalized epoch slot
        // > (optimization to reduce calls to get_ancestor)
        let finalized_slot = self.finalized_slot();

        ensure!(
            finalized_slot < slot,
            Error::<P>::BlockNotAfterFinalizedSlot {
                block_root,
                slot,
                finalized_slot,
            },
        );

        // > Check block is a descendant of the finalized block at the checkpoint finalized slot
        //
        // The block itself is after the finalized slot, so its ancestor there is its parent's.
        ensure!(
            self.get_ancestor(parent_root, finalized_slot) == Some(self.finalized_checkpoint.root),
            Error::<P>::BlockNotDescendantOfFinalized {
                block_root,
                finalized_checkpoint: self.finalized_checkpoint,
            },
        );

        // > Make a copy of the state to avoid mutability issues
        let mut state = parent.state.as_ref().clone();

        // > Check the block is valid and compute the post-state
        state_transition(
            &self.chain_config,
            &mut state,
            block,
            ProcessSlots::IfNeeded,
            self.store_config.state_root_policy,
            verifier,
        )?;

        Ok(BlockAction::Accept(ChainLink {
            block_root,
            header: block.message.to_header(),
            block: Some(block.clone()),
            state: Arc::new(state),
        }))
    }

    fn apply_block(&mut self, chain_link: ChainLink<P>) {
        let block_root = chain_link.block_root;
        let state = chain_link.state.clone();
        let state_justified = state.current_justified_checkpoint;
        let state_finalized = state.finalized_checkpoint;

        let old_justified_checkpoint = self.justified_checkpoint;
        let old_finalized_checkpoint = self.finalized_checkpoint;

        // > Add new block to the store
        // > Add new state for this block to the store
        self.children
            .entry(chain_link.parent_root())
            .or_insert_with(Vector::new)
            .push_back(block_root);

        self.chain_links.insert(block_root, chain_link);

        // > Update justified checkpoint
        if state_justified.epoch > self.justified_checkpoint.epoch {
            if state_justified.epoch > self.best_justified_checkpoint.epoch {
                self.best_justified_checkpoint = state_justified;
            }

            if self.should_update_justified_checkpoint(state_justified) {
                self.justified_checkpoint = state_justified;
            }
        }

        // > Update finalized checkpoint
        if state_finalized.epoch > self.finalized_checkpoint.epoch {
            self.finalized_checkpoint = state_finalized;

            // > Potentially update justified if different from store
            if self.justified_checkpoint != state_justified {
                if state_justified.epoch > self.justified_checkpoint.epoch {
                    // > Update justified if new justified is later than store justified
                    self.justified_checkpoint = state_justified;
                } else {
                    // > Update justified if store justified is not in chain with finalized checkpoint
                    let ancestor_at_finalized_slot =
                        self.get_ancestor(self.justified_checkpoint.root, self.finalized_slot());

                    if ancestor_at_finalized_slot != Some(self.finalized_checkpoint.root) {
                        self.justified_checkpoint = state_justified;
                    }
                }
            }
        }

        if self.justified_checkpoint != old_justified_checkpoint {
            info!(
                "justified checkpoint updated (checkpoint: {:?}, block_root: {block_root:?})",
                self.justified_checkpoint,
            );

            // The state is only needed to compute the head, which recomputes it if this fails.
            if let Err(error) = self.store_checkpoint_state(self.justified_checkpoint) {
                debug!("failed to store justified checkpoint state: {error}");
            }
        }

        if self.finalized_checkpoint != old_finalized_checkpoint {
            info!(
                "finalized checkpoint updated (checkpoint: {:?}, block_root: {block_root:?})",
                self.finalized_checkpoint,
            );

            self.prune_after_finalization();
        }
    }

    /// [`should_update_justified_checkpoint`](https://github.com/ethereum/consensus-specs/blob/v0.12.1/specs/phase0/fork-choice.md#should_update_justified_checkpoint)
    ///
    /// > To address the bouncing attack, only update conflicting justified
    /// > checkpoints in the fork choice if in the early slots of the epoch.
    /// > Otherwise, delay incorporation of new justified checkpoint until next epoch boundary.
    fn should_update_justified_checkpoint(&self, new_justified_checkpoint: Checkpoint) -> bool {
        if slots_since_epoch_start::<P>(self.current_slot()) < P::SAFE_SLOTS_TO_UPDATE_JUSTIFIED {
            return true;
        }

        let justified_slot = compute_start_slot_at_epoch::<P>(self.justified_checkpoint.epoch);

        self.get_ancestor(new_justified_checkpoint.root, justified_slot)
            == Some(self.justified_checkpoint.root)
    }

    fn validate_attestation(
        &self,
        attestation: &Attestation<P>,
        verifier: impl Verifier,
    ) -> Result<AttestationAction<P>> {
        let AttestationData {
            slot,
            beacon_block_root,
            target,
            ..
        } = attestation.data;

        // > Check that the epoch number and slot number are matching
        ensure!(
            target.epoch == compute_epoch_at_slot::<P>(slot),
            Error::AttestationTargetsWrongEpoch {
                attestation: Arc::new(attestation.clone()),
            },
        );

        // Objects that cannot be processed yet are retried at the start of this slot.
        let next_slot = slot
            .checked_add(1)
            .ok_or(Error::<P>::AttestationSlotOutOfRange { slot })?;

        // > Attestations must be from the current or previous epoch
        let previous_epoch = self.previous_epoch();

        ensure!(
            previous_epoch <= target.epoch,
            Error::<P>::AttestationTargetsOldEpoch {
                target,
                previous_epoch,
            },
        );

        if self.current_epoch() < target.epoch {
            return Ok(AttestationAction::DelayUntilSlot(next_slot));
        }

        // > Attestations target be for a known block.
        // > If target block is unknown, delay consideration until the block is found
        if !self.contains_block(target.root) {
            return Ok(AttestationAction::DelayUntilBlock(target.root));
        }

        // > Attestations must be for a known block.
        // > If block is unknown, delay consideration until the block is found
        let Some(ghost_vote_block) = self.chain_links.get(&beacon_block_root) else {
            return Ok(AttestationAction::DelayUntilBlock(beacon_block_root));
        };

        // > Attestations must not be for blocks in the future. If not, the attestation should not be considered
        let block_slot = ghost_vote_block.slot();

        ensure!(
            block_slot <= slot,
            Error::AttestationForFutureBlock {
                attestation: Arc::new(attestation.clone()),
                block_slot,
            },
        );

        // > FFG and LMD vote must be consistent with each other
        let target_slot = compute_start_slot_at_epoch::<P>(target.epoch);

        ensure!(
            self.get_ancestor(beacon_block_root, target_slot) == Some(target.root),
            Error::LmdGhostInconsistentWithFfgTarget {
                attestation: Arc::new(attestation.clone()),
            },
        );

        // > Attestations can only affect the fork choice of subsequent slots.
        // > Delay consideration in the fork choice until their slot is in the past.
        if self.current_slot() <= slot {
            return Ok(AttestationAction::DelayUntilSlot(next_slot));
        }

        // > Get state at the `target` to fully validate attestation
        let target_state = self.checkpoint_state_or_compute(target)?;
        let indexed_attestation = get_indexed_attestation(&target_state, attestation)?;

        validate_indexed_attestation(
            &self.chain_config,
            &target_state,
            &indexed_attestation,
            verifier,
        )?;

        Ok(AttestationAction::Accept {
            target_state,
            attesting_indices: indexed_attestation.attesting_indices.iter().copied().collect(),
        })
    }

    fn apply_attestation(
        &mut self,
        data: AttestationData,
        target_state: Arc<BeaconState<P>>,
        attesting_indices: Vec<ValidatorIndex>,
    ) {
        let AttestationData {
            beacon_block_root,
            target,
            ..
        } = data;

        // > Store target checkpoint state if not yet seen
        self.checkpoint_states.entry(target).or_insert(target_state);

        // > Update latest messages for attesting indices
        for validator_index in attesting_indices {
            let is_newer = self
                .latest_messages
                .get(&validator_index)
                .is_none_or(|message| message.epoch < target.epoch);

            if is_newer {
                self.latest_messages.insert(
                    validator_index,
                    LatestMessage {
                        epoch: target.epoch,
                        root: beacon_block_root,
                    },
                );
            }
        }
    }

    /// [`store_target_checkpoint_state`](https://github.com/ethereum/consensus-specs/blob/v0.12.1/specs/phase0/fork-choice.md#store_target_checkpoint_state)
    fn store_checkpoint_state(&mut self, checkpoint: Checkpoint) -> Result<()> {
        if !self.checkpoint_states.contains_key(&checkpoint) {
            let state = self.checkpoint_state_or_compute(checkpoint)?;
            self.checkpoint_states.insert(checkpoint, state);
        }

        Ok(())
    }

    fn checkpoint_state_or_compute(&self, checkpoint: Checkpoint) -> Result<Arc<BeaconState<P>>> {
        if let Some(state) = self.checkpoint_states.get(&checkpoint) {
            return Ok(state.clone());
        }

        let base_state = self
            .block_state(checkpoint.root)
            .ok_or(Error::<P>::CheckpointBlockMissing { checkpoint })?;

        let epoch_start = compute_start_slot_at_epoch::<P>(checkpoint.epoch);

        if epoch_start <= base_state.slot {
            return Ok(base_state.clone());
        }

        let mut state = base_state.as_ref().clone();
        process_slots(&self.chain_config, &mut state, epoch_start)?;
        Ok(Arc::new(state))
    }

    /// [`filter_block_tree`](https://github.com/ethereum/consensus-specs/blob/v0.12.1/specs/phase0/fork-choice.md#filter_block_tree)
    ///
    /// Returns the roots of all viable blocks in the tree rooted at `block_root`.
    fn filter_block_tree(&self, block_root: H256) -> HashSet<H256> {
        let mut preorder = vec![];
        let mut stack = vec![block_root];

        while let Some(root) = stack.pop() {
            preorder.push(root);
            stack.extend(self.children_of(root));
        }

        let mut viable = HashSet::new();

        // Children come after their parents in `preorder`.
        for root in preorder.into_iter().rev() {
            let mut children = self.children_of(root).peekable();

            // > If any children branches contain expected finalized/justified checkpoints,
            // > add to filtered block-tree and signal viability to parent.
            if children.peek().is_some() {
                if children.any(|child| viable.contains(&child)) {
                    viable.insert(root);
                }

                continue;
            }

            let Some(head_state) = self.block_state(root) else {
                continue;
            };

            // > If leaf block, check finalized/justified checkpoints as matching latest.
            let correct_justified = self.justified_checkpoint.epoch == GENESIS_EPOCH
                || head_state.current_justified_checkpoint == self.justified_checkpoint;

            let correct_finalized = self.finalized_checkpoint.epoch == GENESIS_EPOCH
                || head_state.finalized_checkpoint == self.finalized_checkpoint;

            // > If expected finalized/justified, add to viable block-tree and signal viability to parent.
            if correct_justified && correct_finalized {
                viable.insert(root);
            }
        }

        viable
    }

    // Blocks that do not descend from the finalized block can never become part of the chain.
    // Neither can blocks at or before the finalized slot other than the finalized block itself.
    fn prune_after_finalization(&mut self) {
        let finalized_checkpoint = self.finalized_checkpoint;
        let finalized_slot = self.finalized_slot();

        let mut kept = HashSet::new();
        let mut stack = vec![finalized_checkpoint.root];

        while let Some(root) = stack.pop() {
            kept.insert(root);

            stack.extend(self.children_of(root).filter(|child| {
                self.chain_links
                    .get(child)
                    .is_some_and(|chain_link| chain_link.slot() > finalized_slot)
            }));
        }

        let block_count = self.chain_links.len();

        self.chain_links.retain(|root, _| kept.contains(root));
        self.children.retain(|root, _| kept.contains(root));

        for (_, children) in self.children.iter_mut() {
            children.retain(|child| kept.contains(child));
        }

        self.checkpoint_states.retain(|checkpoint, _| {
            finalized_checkpoint.epoch <= checkpoint.epoch && kept.contains(&checkpoint.root)
        });

        if !kept.contains(&self.best_justified_checkpoint.root) {
            self.best_justified_checkpoint = self.justified_checkpoint;
        }

        debug!(
            "pruned {} blocks after finalization (finalized_checkpoint: {finalized_checkpoint:?})",
            block_count - self.chain_links.len(),
        );
    }

    /// [`get_latest_attesting_balance`](https://github.com/ethereum/consensus-specs/blob/v0.12.1/specs/phase0/fork-choice.md#get_latest_attesting_balance)
    /// for all blocks after `justified_slot` at once.
    ///
    /// A validator counts toward a block if the block is its latest message's root or an ancestor
    /// of it.
    fn latest_attesting_balances(
        &self,
        justified_state: &BeaconState<P>,
        justified_slot: Slot,
    ) -> Result<std::collections::HashMap<H256, Gwei>> {
        let mut balances = std::collections::HashMap::<H256, Gwei>::new();
        let epoch = get_current_epoch(justified_state);

        for validator_index in get_active_validator_indices(justified_state, epoch) {
            let Some(message) = self.latest_messages.get(&validator_index) else {
                continue;
            };

            let effective_balance = justified_state
                .validators
                .get(validator_index)?
                .effective_balance;

            let mut root = message.root;

            while let Some(chain_link) = self.chain_links.get(&root) {
                if chain_link.slot() <= justified_slot {
                    break;
                }

                *balances.entry(root).or_default() += effective_balance;
                root = chain_link.parent_root();
            }
        }

        Ok(balances)
    }

    fn slot_at(&self, time: UnixSeconds) -> Slot {
        let seconds_since_genesis = time.saturating_sub(self.genesis_time);
        GENESIS_SLOT + seconds_since_genesis / self.chain_config.seconds_per_slot
    }

    fn children_of(&self, block_root: H256) -> impl Iterator<Item = H256> + '_ {
        self.children
            .get(&block_root)
            .into_iter()
            .flat_map(|children| children.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use helper_functions::{accessors::get_committee_assignment, verifier::NullVerifier};
    use test_case::test_case;
    use types::{nonstandard::ErrorKind, preset::Minimal};

    use crate::misc::error_kind;

    use super::*;

    fn genesis_store() -> Result<(Store<Minimal>, Arc<BeaconState<Minimal>>)> {
        let config = Arc::new(Minimal::default_config());
        let (genesis_state, _) = factory::min_genesis_state::<Minimal>(&config)?;
        let store = Store::new(config, StoreConfig::default(), genesis_state.clone());

        Ok((store, genesis_state))
    }

    fn tick_to_slot(store: &mut Store<Minimal>, slot: Slot) -> Result<()> {
        let time = store.genesis_time + store.chain_config.seconds_per_slot.get() * slot;
        store.on_tick(time)
    }

    fn graffiti(byte: u8) -> H256 {
        H256::repeat_byte(byte)
    }

    #[test]
    fn new_store_is_anchored_at_genesis() -> Result<()> {
        let (store, genesis_state) = genesis_store()?;
        let anchor_root = helper_functions::accessors::latest_block_root(&genesis_state);

        assert_eq!(store.current_slot(), 0);
        assert_eq!(store.justified_checkpoint(), Checkpoint { epoch: 0, root: anchor_root });
        assert_eq!(store.finalized_checkpoint(), store.justified_checkpoint());
        assert_eq!(store.best_justified_checkpoint(), store.justified_checkpoint());
        assert!(store.contains_block(anchor_root));
        assert!(store.block(anchor_root).is_none());
        assert!(store.checkpoint_state(store.justified_checkpoint()).is_some());
        assert_eq!(store.get_head()?, anchor_root);

        Ok(())
    }

    #[test]
    fn earlier_ticks_are_ignored() -> Result<()> {
        let (mut store, _) = genesis_store()?;

        tick_to_slot(&mut store, 5)?;
        tick_to_slot(&mut store, 3)?;

        assert_eq!(store.current_slot(), 5);

        Ok(())
    }

    #[test_case(1, 2)]
    #[test_case(2, 1)]
    #[test_case(7, 200)]
    fn siblings_with_equal_weight_are_ordered_by_root(
        graffiti_a: u8,
        graffiti_b: u8,
    ) -> Result<()> {
        let (mut store, genesis_state) = genesis_store()?;
        let config = store.chain_config().clone();

        let (block_a, _) =
            factory::empty_block(&config, genesis_state.clone(), 1, graffiti(graffiti_a))?;
        let (block_b, _) = factory::empty_block(&config, genesis_state, 1, graffiti(graffiti_b))?;

        tick_to_slot(&mut store, 1)?;

        assert!(store.on_block(block_a.clone(), NullVerifier).is_accepted());
        assert!(store.on_block(block_b.clone(), NullVerifier).is_accepted());

        let root_a = block_a.message.hash_tree_root();
        let root_b = block_b.message.hash_tree_root();

        assert_ne!(root_a, root_b);
        assert_eq!(store.get_head()?, root_a.max(root_b));

        Ok(())
    }

    #[test]
    fn attestation_outweighs_root_tie_break() -> Result<()> {
        let (mut store, genesis_state) = genesis_store()?;
        let config = store.chain_config().clone();

        let (block_a, state_a) =
            factory::empty_block(&config, genesis_state.clone(), 1, graffiti(1))?;
        let (block_b, state_b) = factory::empty_block(&config, genesis_state, 1, graffiti(2))?;

        tick_to_slot(&mut store, 1)?;

        assert!(store.on_block(block_a.clone(), NullVerifier).is_accepted());
        assert!(store.on_block(block_b.clone(), NullVerifier).is_accepted());

        let root_a = block_a.message.hash_tree_root();
        let root_b = block_b.message.hash_tree_root();

        let (lesser_root, lesser_state) = if root_a < root_b {
            (root_a, state_a)
        } else {
            (root_b, state_b)
        };

        // Any validator assigned to a slot after the blocks can vote for them.
        let validator_index = (0..64)
            .find(|validator_index| {
                get_committee_assignment(&lesser_state, 0, *validator_index)
                    .ok()
                    .flatten()
                    .is_some_and(|assignment| assignment.slot >= 1)
            })
            .expect("some validator should attest after slot 0");

        let attestation = Arc::new(factory::singular_attestation(&lesser_state, 0, validator_index)?);

        assert_eq!(
            store.on_attestation(attestation.clone(), NullVerifier).error_kind::<Minimal>(),
            Some(ErrorKind::TemporalViolation),
        );

        tick_to_slot(&mut store, 8)?;

        assert!(store.on_attestation(attestation, NullVerifier).is_accepted());
        assert_eq!(
            store.latest_message(validator_index),
            Some(LatestMessage {
                epoch: 0,
                root: lesser_root,
            }),
        );
        assert_eq!(store.get_head()?, lesser_root);

        Ok(())
    }

    #[test]
    fn finality_never_regresses() -> Result<()> {
        let (mut store, genesis_state) = genesis_store()?;
        let config = store.chain_config().clone();
        let (blocks, _) = factory::full_blocks_up_to_epoch(&config, genesis_state, 5)?;

        let mut justified_epoch = store.justified_checkpoint().epoch;
        let mut finalized_epoch = store.finalized_checkpoint().epoch;

        for block in &blocks {
            tick_to_slot(&mut store, block.message.slot)?;

            assert!(store.on_block(block.clone(), NullVerifier).is_accepted());

            assert!(justified_epoch <= store.justified_checkpoint().epoch);
            assert!(finalized_epoch <= store.finalized_checkpoint().epoch);

            justified_epoch = store.justified_checkpoint().epoch;
            finalized_epoch = store.finalized_checkpoint().epoch;
        }

        let last_block = blocks.last().expect("blocks up to epoch 5 should not be empty");

        assert_eq!(store.justified_checkpoint().epoch, 4);
        assert_eq!(store.finalized_checkpoint().epoch, 3);
        assert_eq!(store.get_head()?, last_block.message.hash_tree_root());

        Ok(())
    }

    #[test]
    fn blocks_with_missing_references_are_delayed() -> Result<()> {
        let (mut store, genesis_state) = genesis_store()?;
        let config = store.chain_config().clone();

        let (block_1, state_1) = factory::empty_block(&config, genesis_state, 1, H256::zero())?;
        let (block_2, _) = factory::empty_block(&config, state_1, 2, H256::zero())?;

        let outcome = store.on_block(block_1.clone(), NullVerifier);

        assert!(matches!(
            outcome,
            ValidationOutcome::NotYetValid(MissingReference::Slot(1)),
        ));

        tick_to_slot(&mut store, 2)?;

        let outcome = store.on_block(block_2.clone(), NullVerifier);
        let root_1 = block_1.message.hash_tree_root();

        assert!(matches!(
            outcome,
            ValidationOutcome::NotYetValid(MissingReference::Block(root)) if root == root_1,
        ));

        assert!(store.on_block(block_1, NullVerifier).is_accepted());
        assert!(store.on_block(block_2.clone(), NullVerifier).is_accepted());
        assert_eq!(store.get_head()?, block_2.message.hash_tree_root());

        Ok(())
    }

    #[test]
    fn invalid_block_leaves_store_unchanged() -> Result<()> {
        let (mut store, genesis_state) = genesis_store()?;
        let config = store.chain_config().clone();
        let (block, _) = factory::empty_block(&config, genesis_state, 1, H256::zero())?;

        let mut block = Arc::unwrap_or_clone(block);
        block.message.state_root = H256::repeat_byte(0xff);

        let block_root = block.message.hash_tree_root();

        tick_to_slot(&mut store, 1)?;

        let outcome = store.on_block(Arc::new(block), NullVerifier);

        assert_eq!(
            outcome.error_kind::<Minimal>(),
            Some(ErrorKind::MalformedInput),
        );
        assert!(!store.contains_block(block_root));
        assert_eq!(store.chain_links.len(), 1);

        Ok(())
    }

    #[test]
    fn attestation_for_unknown_block_is_delayed() -> Result<()> {
        let (mut store, genesis_state) = genesis_store()?;
        let config = store.chain_config().clone();
        let (block, state) = factory::empty_block(&config, genesis_state, 1, H256::zero())?;
        let attestation = Arc::new(factory::singular_attestation(&state, 0, 0)?);

        tick_to_slot(&mut store, 8)?;

        let outcome = store.on_attestation(attestation, NullVerifier);
        let block_root = block.message.hash_tree_root();

        assert!(matches!(
            outcome,
            ValidationOutcome::NotYetValid(MissingReference::Block(root)) if root == block_root,
        ));

        Ok(())
    }

    #[test]
    fn attestation_with_largest_slot_is_rejected() -> Result<()> {
        let (mut store, genesis_state) = genesis_store()?;
        let mut attestation = factory::singular_attestation(&genesis_state, 0, 0)?;

        attestation.data.slot = Slot::MAX;
        attestation.data.target.epoch = compute_epoch_at_slot::<Minimal>(Slot::MAX);

        let outcome = store.on_attestation(Arc::new(attestation), NullVerifier);

        let ValidationOutcome::InvalidForever(error) = outcome else {
            panic!("attestation should be rejected");
        };

        assert!(matches!(
            error.downcast_ref::<Error<Minimal>>(),
            Some(Error::AttestationSlotOutOfRange { slot: Slot::MAX }),
        ));
        assert_eq!(error_kind::<Minimal>(&error), ErrorKind::MalformedInput);

        Ok(())
    }

    // Chain A justifies epoch 2 with the block at slot 1 as the target.
    // Chain B forks off genesis and justifies epoch 3 with its own block at slot 1.
    // Chain B is delivered in the next epoch, either early enough to switch immediately or late
    // enough that the switch waits for the epoch boundary.
    #[test_case(33, 3; "early in epoch")]
    #[test_case(35, 2; "after safe slots")]
    fn conflicting_justified_checkpoint_is_deferred_until_epoch_boundary(
        delivery_slot: Slot,
        justified_epoch_after_delivery: Epoch,
    ) -> Result<()> {
        let (mut store, genesis_state) = genesis_store()?;
        let config = store.chain_config().clone();

        let (block_a1, state_a1) =
            factory::empty_block(&config, genesis_state.clone(), 1, graffiti(1))?;
        let (block_a23, state_a23) =
            factory::block_justifying_current_epoch(&config, state_a1, 2, graffiti(1))?;
        let (block_a24, _) = factory::empty_block(&config, state_a23, 24, graffiti(1))?;

        let (block_b1, state_b1) = factory::empty_block(&config, genesis_state, 1, graffiti(2))?;
        let (block_b31, state_b31) =
            factory::block_justifying_current_epoch(&config, state_b1, 3, graffiti(2))?;
        let (block_b32, _) = factory::empty_block(&config, state_b31, 32, graffiti(2))?;

        let checkpoint_a = Checkpoint {
            epoch: 2,
            root: block_a1.message.hash_tree_root(),
        };

        let checkpoint_b = Checkpoint {
            epoch: 3,
            root: block_b1.message.hash_tree_root(),
        };

        tick_to_slot(&mut store, 24)?;

        for block in [block_a1, block_a23, block_a24] {
            assert!(store.on_block(block, NullVerifier).is_accepted());
        }

        assert_eq!(store.justified_checkpoint(), checkpoint_a);

        tick_to_slot(&mut store, delivery_slot)?;

        for block in [block_b1, block_b31, block_b32.clone()] {
            assert!(store.on_block(block, NullVerifier).is_accepted());
        }

        assert_eq!(store.best_justified_checkpoint(), checkpoint_b);
        assert_eq!(
            store.justified_checkpoint().epoch,
            justified_epoch_after_delivery,
        );

        tick_to_slot(&mut store, 40)?;

        assert_eq!(store.justified_checkpoint(), checkpoint_b);
        assert!(store.checkpoint_state(checkpoint_b).is_some());
        assert_eq!(store.get_head()?, block_b32.message.hash_tree_root());

        Ok(())
    }

    #[test]
    fn failed_tick_leaves_store_unchanged() -> Result<()> {
        let (mut store, _) = genesis_store()?;
        let justified_checkpoint = store.justified_checkpoint();
        let time = store.time();

        store.best_justified_checkpoint = Checkpoint {
            epoch: 1,
            root: H256::repeat_byte(0xee),
        };

        tick_to_slot(&mut store, 8).expect_err("checkpoint block is not in the store");

        assert_eq!(store.time(), time);
        assert_eq!(store.justified_checkpoint(), justified_checkpoint);

        Ok(())
    }

    #[test]
    fn blocks_before_finalized_checkpoint_are_pruned() -> Result<()> {
        let (mut store, genesis_state) = genesis_store()?;
        let config = store.chain_config().clone();
        let anchor_root = helper_functions::accessors::latest_block_root(&genesis_state);
        let (blocks, _) = factory::full_blocks_up_to_epoch(&config, genesis_state, 5)?;

        for block in &blocks {
            tick_to_slot(&mut store, block.message.slot)?;
            assert!(store.on_block(block.clone(), NullVerifier).is_accepted());
        }

        let finalized_checkpoint = store.finalized_checkpoint();
        let finalized_slot = store.finalized_slot();
        let last_block = blocks.last().expect("blocks up to epoch 5 should not be empty");

        assert_eq!(finalized_checkpoint.epoch, 3);
        assert!(!store.contains_block(anchor_root));
        assert!(!store.contains_block(blocks[0].message.hash_tree_root()));
        assert!(store.contains_block(finalized_checkpoint.root));
        assert_eq!(
            store.chain_links.len(),
            blocks
                .iter()
                .filter(|block| block.message.slot >= finalized_slot)
                .count(),
        );
        assert!(store
            .checkpoint_states
            .keys()
            .all(|checkpoint| finalized_checkpoint.epoch <= checkpoint.epoch));
        assert_eq!(store.get_head()?, last_block.message.hash_tree_root());

        Ok(())
    }
}
