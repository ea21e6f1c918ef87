use anyhow::Result;
use bls::{PublicKeyBytes, SignatureBytes};
use derive_more::From;
use ssz::SszHash;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        consts::{
            DOMAIN_BEACON_ATTESTER, DOMAIN_BEACON_PROPOSER, DOMAIN_DEPOSIT, DOMAIN_RANDAO,
            DOMAIN_VOLUNTARY_EXIT,
        },
        containers::{
            AttestationData, BeaconBlock, BeaconBlockHeader, DepositMessage, VoluntaryExit,
        },
        primitives::{DomainType, Epoch, H256},
    },
    preset::Preset,
};

use crate::{accessors, error::SignatureKind, misc, verifier::Verifier};

// `Epoch` and `Slot` are the same type, so RANDAO reveals need a wrapper to get their own impl.
#[derive(Clone, Copy, From, SszHash)]
#[ssz(transparent)]
pub struct RandaoEpoch(Epoch);

/// Objects signed over a domain that does not depend on the fork. Only deposits.
pub trait SignForAllForks: SszHash {
    const DOMAIN_TYPE: DomainType;
    const SIGNATURE_KIND: SignatureKind;

    fn signing_root(&self, config: &Config) -> H256 {
        let domain = misc::compute_domain(config, Self::DOMAIN_TYPE, None, None);
        misc::compute_signing_root(self, domain)
    }

    fn verify(
        &self,
        config: &Config,
        signature_bytes: SignatureBytes,
        public_key: PublicKeyBytes,
        mut verifier: impl Verifier,
    ) -> Result<()> {
        verifier.verify_singular(
            self.signing_root(config),
            signature_bytes,
            public_key,
            Self::SIGNATURE_KIND,
        )
    }
}

/// Objects signed over the domain of the fork active at [`SignForSingleFork::epoch`].
pub trait SignForSingleFork<P: Preset>: SszHash {
    const DOMAIN_TYPE: DomainType;
    const SIGNATURE_KIND: SignatureKind;

    fn epoch(&self) -> Epoch;

    fn signing_root(&self, config: &Config, state: &BeaconState<P>) -> H256 {
        let domain = accessors::get_domain(config, state, Self::DOMAIN_TYPE, Some(self.epoch()));
        misc::compute_signing_root(self, domain)
    }

    fn verify(
        &self,
        config: &Config,
        state: &BeaconState<P>,
        signature_bytes: SignatureBytes,
        public_key: PublicKeyBytes,
        mut verifier: impl Verifier,
    ) -> Result<()> {
        verifier.verify_singular(
            self.signing_root(config, state),
            signature_bytes,
            public_key,
            Self::SIGNATURE_KIND,
        )
    }
}

impl SignForAllForks for DepositMessage {
    const DOMAIN_TYPE: DomainType = DOMAIN_DEPOSIT;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Deposit;
}

impl<P: Preset> SignForSingleFork<P> for AttestationData {
    const DOMAIN_TYPE: DomainType = DOMAIN_BEACON_ATTESTER;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Attestation;

    fn epoch(&self) -> Epoch {
        self.target.epoch
    }
}

impl<P: Preset> SignForSingleFork<P> for BeaconBlock<P> {
    const DOMAIN_TYPE: DomainType = DOMAIN_BEACON_PROPOSER;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Block;

    fn epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.slot)
    }
}

// Headers in proposer slashings are signed like the blocks they summarize.
impl<P: Preset> SignForSingleFork<P> for BeaconBlockHeader {
    const DOMAIN_TYPE: DomainType = DOMAIN_BEACON_PROPOSER;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Block;

    fn epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.slot)
    }
}

impl<P: Preset> SignForSingleFork<P> for RandaoEpoch {
    const DOMAIN_TYPE: DomainType = DOMAIN_RANDAO;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Randao;

    fn epoch(&self) -> Epoch {
        self.0
    }
}

impl<P: Preset> SignForSingleFork<P> for VoluntaryExit {
    const DOMAIN_TYPE: DomainType = DOMAIN_VOLUNTARY_EXIT;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::VoluntaryExit;

    fn epoch(&self) -> Epoch {
        self.epoch
    }
}
