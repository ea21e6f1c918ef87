use std::sync::Arc;

use derivative::Derivative;
use types::{
    phase0::containers::{Attestation, SignedBeaconBlock},
    preset::Preset,
};

/// Objects waiting for the same block or slot.
#[derive(Derivative)]
#[derivative(Default(bound = ""))]
pub struct Delayed<P: Preset> {
    pub blocks: Vec<Arc<SignedBeaconBlock<P>>>,
    pub attestations: Vec<Arc<Attestation<P>>>,
}

impl<P: Preset> Delayed<P> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let Self {
            blocks,
            attestations,
        } = self;

        blocks.len() + attestations.len()
    }

    pub fn extend(&mut self, other: Self) {
        let Self {
            blocks,
            attestations,
        } = other;

        self.blocks.extend(blocks);
        self.attestations.extend(attestations);
    }
}

pub enum PendingObject<P: Preset> {
    Block(Arc<SignedBeaconBlock<P>>),
    Attestation(Arc<Attestation<P>>),
}

impl<P: Preset> PendingObject<P> {
    pub fn add_to(self, delayed: &mut Delayed<P>) {
        match self {
            Self::Block(block) => delayed.blocks.push(block),
            Self::Attestation(attestation) => delayed.attestations.push(attestation),
        }
    }
}
