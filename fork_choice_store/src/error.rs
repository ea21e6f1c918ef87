use std::sync::Arc;

use thiserror::Error;
use types::{
    nonstandard::ErrorKind,
    phase0::{
        containers::{Attestation, Checkpoint},
        primitives::{Epoch, Slot, H256},
    },
    preset::Preset,
};

#[derive(Debug, Error)]
pub enum Error<P: Preset> {
    #[error(
        "attestation votes for a block from the future \
         (attestation: {attestation:?}, block_slot: {block_slot})"
    )]
    AttestationForFutureBlock {
        attestation: Arc<Attestation<P>>,
        block_slot: Slot,
    },
    #[error(
        "attestation targets an epoch that is too old \
         (target: {target:?}, previous_epoch: {previous_epoch})"
    )]
    AttestationTargetsOldEpoch {
        target: Checkpoint,
        previous_epoch: Epoch,
    },
    #[error("attestation slot is too large to be processed: {slot}")]
    AttestationSlotOutOfRange { slot: Slot },
    #[error("attestation votes for a checkpoint in the wrong epoch: {attestation:?}")]
    AttestationTargetsWrongEpoch { attestation: Arc<Attestation<P>> },
    #[error(
        "block is not later than finalized slot \
         (block_root: {block_root:?}, slot: {slot}, finalized_slot: {finalized_slot})"
    )]
    BlockNotAfterFinalizedSlot {
        block_root: H256,
        slot: Slot,
        finalized_slot: Slot,
    },
    #[error(
        "block does not descend from finalized block \
         (block_root: {block_root:?}, finalized_checkpoint: {finalized_checkpoint:?})"
    )]
    BlockNotDescendantOfFinalized {
        block_root: H256,
        finalized_checkpoint: Checkpoint,
    },
    #[error("block for checkpoint is not in store: {checkpoint:?}")]
    CheckpointBlockMissing { checkpoint: Checkpoint },
    #[error("LMD GHOST vote is inconsistent with FFG vote target (attestation: {attestation:?})")]
    LmdGhostInconsistentWithFfgTarget { attestation: Arc<Attestation<P>> },
}

impl<P: Preset> Error<P> {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AttestationSlotOutOfRange { .. }
            | Self::AttestationTargetsWrongEpoch { .. }
            | Self::LmdGhostInconsistentWithFfgTarget { .. } => ErrorKind::MalformedInput,
            Self::AttestationForFutureBlock { .. }
            | Self::BlockNotAfterFinalizedSlot { .. }
            | Self::BlockNotDescendantOfFinalized { .. } => ErrorKind::PreconditionViolation,
            Self::AttestationTargetsOldEpoch { .. } => ErrorKind::TemporalViolation,
            Self::CheckpointBlockMissing { .. } => ErrorKind::UnknownReference,
        }
    }
}
