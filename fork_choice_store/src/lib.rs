//! Implementation of [Beacon Chain Fork Choice].
//!
//! [`Store`] keeps every block that descends from the anchor along with its post-state.
//! Blocks are linked to their children, so the head is found by walking down from the justified
//! block. Filtering and weighing are done from scratch on every call to [`Store::get_head`].
//!
//! Block and attestation processing is split into pairs of `validate_*` and `apply_*` methods.
//! The `validate_*` methods do not mutate [`Store`]. A rejected object leaves the store unchanged.
//! Objects that refer to unknown blocks or to slots in the future are neither accepted nor
//! rejected. They are reported as [`ValidationOutcome::NotYetValid`] so that the caller can retry
//! them later.
//!
//! This implementation makes use of persistent data structures.
//! They are only used to make snapshots cheap.
//!
//! [Beacon Chain Fork Choice]: https://github.com/ethereum/consensus-specs/blob/v0.12.1/specs/phase0/fork-choice.md

pub use crate::{
    error::Error,
    misc::{error_kind, ChainLink, LatestMessage, MissingReference, ValidationOutcome},
    store::Store,
    store_config::StoreConfig,
};

mod error;
mod misc;
mod store;
mod store_config;
