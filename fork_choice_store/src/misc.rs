use std::sync::Arc;

use helper_functions::error::Error as HelperError;
use ssz::{IndexError, PushError, ReadError};
use types::{
    nonstandard::ErrorKind,
    phase0::{
        beacon_state::BeaconState,
        containers::{BeaconBlockHeader, SignedBeaconBlock},
        primitives::{Epoch, Slot, ValidatorIndex, H256},
    },
    preset::Preset,
};

use crate::error::Error;

/// A block known to a [`Store`] together with its post-state.
///
/// The anchor has no [`SignedBeaconBlock`]. Only its header is known.
///
/// [`Store`]: crate::Store
#[derive(Clone, Debug)]
pub struct ChainLink<P: Preset> {
    pub block_root: H256,
    pub header: BeaconBlockHeader,
    pub block: Option<Arc<SignedBeaconBlock<P>>>,
    pub state: Arc<BeaconState<P>>,
}

impl<P: Preset> ChainLink<P> {
    #[must_use]
    pub const fn slot(&self) -> Slot {
        self.header.slot
    }

    #[must_use]
    pub const fn parent_root(&self) -> H256 {
        self.header.parent_root
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LatestMessage {
    pub epoch: Epoch,
    pub root: H256,
}

/// What an object refers to that the [`Store`] does not have yet.
///
/// [`Store`]: crate::Store
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum MissingReference {
    Block(H256),
    /// The object becomes valid once the store reaches this slot.
    Slot(Slot),
}

#[derive(Debug)]
pub enum ValidationOutcome {
    Accepted,
    InvalidForever(anyhow::Error),
    NotYetValid(MissingReference),
}

impl ValidationOutcome {
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    #[must_use]
    pub fn error_kind<P: Preset>(&self) -> Option<ErrorKind> {
        match self {
            Self::Accepted => None,
            Self::InvalidForever(error) => Some(error_kind::<P>(error)),
            Self::NotYetValid(MissingReference::Block(_)) => Some(ErrorKind::UnknownReference),
            Self::NotYetValid(MissingReference::Slot(_)) => Some(ErrorKind::TemporalViolation),
        }
    }
}

/// Classifies errors produced while validating objects.
///
/// Errors of types outside the workspace are treated as [`ErrorKind::MalformedInput`].
#[must_use]
pub fn error_kind<P: Preset>(error: &anyhow::Error) -> ErrorKind {
    if let Some(error) = error.downcast_ref::<Error<P>>() {
        return error.kind();
    }

    if let Some(error) = error.downcast_ref::<transition_functions::Error<P>>() {
        return error.kind();
    }

    if let Some(error) = error.downcast_ref::<HelperError>() {
        return error.kind();
    }

    if let Some(error) = error.downcast_ref::<ReadError>() {
        return error.into();
    }

    if let Some(error) = error.downcast_ref::<PushError>() {
        return error.into();
    }

    if let Some(error) = error.downcast_ref::<IndexError>() {
        return error.into();
    }

    ErrorKind::MalformedInput
}

pub enum BlockAction<P: Preset> {
    Accept(ChainLink<P>),
    Ignore,
    DelayUntilParent(H256),
    DelayUntilSlot(Slot),
}

pub enum AttestationAction<P: Preset> {
    Accept {
        target_state: Arc<BeaconState<P>>,
        attesting_indices: Vec<ValidatorIndex>,
    },
    DelayUntilBlock(H256),
    DelayUntilSlot(Slot),
}
