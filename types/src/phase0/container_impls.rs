use bls::SignatureBytes;
use ssz::SszHash as _;

use crate::{
    phase0::containers::{
        Attestation, BeaconBlock, BeaconBlockHeader, DepositData, DepositMessage,
        PendingAttestation, SignedBeaconBlock, SignedBeaconBlockHeader, SignedVoluntaryExit,
        VoluntaryExit,
    },
    preset::Preset,
};

impl<P: Preset> BeaconBlock<P> {
    #[must_use]
    pub const fn with_signature(self, signature: SignatureBytes) -> SignedBeaconBlock<P> {
        SignedBeaconBlock {
            message: self,
            signature,
        }
    }

    /// Summarizes the block the way it is recorded in `BeaconState.latest_block_header`.
    #[must_use]
    pub fn to_header(&self) -> BeaconBlockHeader {
        BeaconBlockHeader {
            slot: self.slot,
            proposer_index: self.proposer_index,
            parent_root: self.parent_root,
            state_root: self.state_root,
            body_root: self.body.hash_tree_root(),
        }
    }
}

impl<P: Preset> SignedBeaconBlock<P> {
    #[must_use]
    pub fn to_header(&self) -> SignedBeaconBlockHeader {
        self.message.to_header().with_signature(self.signature)
    }
}

impl BeaconBlockHeader {
    #[inline]
    #[must_use]
    pub const fn with_signature(self, signature: SignatureBytes) -> SignedBeaconBlockHeader {
        SignedBeaconBlockHeader {
            message: self,
            signature,
        }
    }
}

impl VoluntaryExit {
    #[inline]
    #[must_use]
    pub const fn with_signature(self, signature: SignatureBytes) -> SignedVoluntaryExit {
        SignedVoluntaryExit {
            message: self,
            signature,
        }
    }
}

impl<P: Preset> PendingAttestation<P> {
    /// Records `attestation` as included `inclusion_delay` slots after it was made.
    #[must_use]
    pub fn new(attestation: &Attestation<P>, inclusion_delay: u64, proposer_index: u64) -> Self {
        Self {
            aggregation_bits: attestation.aggregation_bits.clone(),
            data: attestation.data,
            inclusion_delay,
            proposer_index,
        }
    }
}

impl From<DepositData> for DepositMessage {
    #[inline]
    fn from(deposit_data: DepositData) -> Self {
        let DepositData {
            pubkey,
            withdrawal_credentials,
            amount,
            ..
        } = deposit_data;

        Self {
            pubkey,
            withdrawal_credentials,
            amount,
        }
    }
}
