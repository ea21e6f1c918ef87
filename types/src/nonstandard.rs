//! Types that do not appear in the consensus specifications.

use derive_more::Display;
use ssz::{IndexError, PushError, ReadError};

/// Epoch relative to the current epoch of a state.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum RelativeEpoch {
    Previous,
    Current,
    Next,
}

/// Epochs that an attestation processed by a state may target.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AttestationEpoch {
    Previous,
    Current,
}

impl From<AttestationEpoch> for RelativeEpoch {
    fn from(attestation_epoch: AttestationEpoch) -> Self {
        match attestation_epoch {
            AttestationEpoch::Previous => Self::Previous,
            AttestationEpoch::Current => Self::Current,
        }
    }
}

/// Coarse classification of every error produced by the workspace.
///
/// Callers that only need to decide whether to retry, drop or report an object can match on
/// this instead of on individual error types.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
pub enum ErrorKind {
    /// The object can never be valid regardless of context.
    #[display("malformed input")]
    MalformedInput,
    /// The object is well-formed but conflicts with the state it is applied to.
    #[display("precondition violation")]
    PreconditionViolation,
    /// The object refers to something that is not known yet.
    #[display("unknown reference")]
    UnknownReference,
    /// The object is from the future or refers to an epoch or slot that is out of range.
    #[display("temporal violation")]
    TemporalViolation,
    /// A capacity limit was exceeded.
    #[display("resource exhaustion")]
    ResourceExhaustion,
}

impl From<&ReadError> for ErrorKind {
    fn from(_: &ReadError) -> Self {
        Self::MalformedInput
    }
}

impl From<&PushError> for ErrorKind {
    fn from(_: &PushError) -> Self {
        Self::ResourceExhaustion
    }
}

impl From<&IndexError> for ErrorKind {
    fn from(error: &IndexError) -> Self {
        match error {
            IndexError::DoesNotFitInUsize { .. } => Self::MalformedInput,
            IndexError::OutOfBounds { .. } => Self::PreconditionViolation,
        }
    }
}
