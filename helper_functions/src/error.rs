use derive_more::Display;
use thiserror::Error;
use types::{
    nonstandard::ErrorKind,
    phase0::primitives::{CommitteeIndex, Slot},
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("attestation has no attesting indices")]
    AttestationHasNoAttestingIndices,
    #[error("attesting indices are not sorted and unique")]
    AttestingIndicesNotSortedAndUnique,
    #[error("committee index {index} is out of bounds (committees per slot: {committees_per_slot})")]
    CommitteeIndexOutOfBounds {
        index: CommitteeIndex,
        committees_per_slot: u64,
    },
    #[error(
        "aggregation bitlist length {aggregation_bitlist_length} \
         does not match committee length {committee_length}"
    )]
    CommitteeLengthMismatch {
        aggregation_bitlist_length: usize,
        committee_length: usize,
    },
    #[error("epoch is after next one relative to state")]
    EpochAfterNext,
    #[error("epoch is before previous one relative to state")]
    EpochBeforePrevious,
    #[error("epoch is in the future relative to state")]
    EpochInTheFuture,
    #[error("epoch number overflowed")]
    EpochOverflow,
    #[error("failed to select proposer")]
    FailedToSelectProposer,
    #[error("no validators are active")]
    NoActiveValidators,
    #[error("{0} is invalid")]
    SignatureInvalid(SignatureKind),
    #[error("slot {slot} is out of range of state at slot {state_slot}")]
    SlotOutOfRange { slot: Slot, state_slot: Slot },
}

impl Error {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AttestationHasNoAttestingIndices
            | Self::AttestingIndicesNotSortedAndUnique
            | Self::CommitteeLengthMismatch { .. }
            | Self::SignatureInvalid(_) => ErrorKind::MalformedInput,
            Self::CommitteeIndexOutOfBounds { .. }
            | Self::FailedToSelectProposer
            | Self::NoActiveValidators => ErrorKind::PreconditionViolation,
            Self::EpochAfterNext
            | Self::EpochBeforePrevious
            | Self::EpochInTheFuture
            | Self::SlotOutOfRange { .. } => ErrorKind::TemporalViolation,
            Self::EpochOverflow => ErrorKind::ResourceExhaustion,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum SignatureKind {
    #[display("attestation signature")]
    Attestation,
    #[display("block signature")]
    Block,
    #[display("deposit signature")]
    Deposit,
    #[display("RANDAO reveal")]
    Randao,
    #[display("voluntary exit signature")]
    VoluntaryExit,
}
