//! A thread-safe facade over [`fork_choice_store::Store`].
//!
//! [`Controller`] accepts blocks, attestations and ticks from any thread.
//! Objects that refer to blocks or slots the store has not seen yet are kept and retried
//! automatically.

pub use crate::controller::Controller;

mod controller;
mod misc;
mod mutator;
