use ssz::{ContiguousList, ContiguousVector};

use crate::{
    phase0::{
        containers::{Eth1Data, PendingAttestation, Validator},
        primitives::{Gwei, H256},
    },
    preset::{MaxAttestationsPerEpoch, Preset, SlotsPerEth1VotingPeriod, SlotsPerHistoricalRoot},
};

pub type Attestations<P> = ContiguousList<PendingAttestation<P>, MaxAttestationsPerEpoch<P>>;

pub type Balances<P> = ContiguousList<Gwei, <P as Preset>::ValidatorRegistryLimit>;

pub type Eth1DataVotes<P> = ContiguousList<Eth1Data, SlotsPerEth1VotingPeriod<P>>;

pub type HistoricalRoots<P> = ContiguousList<H256, <P as Preset>::HistoricalRootsLimit>;

pub type RandaoMixes<P> = ContiguousVector<H256, <P as Preset>::EpochsPerHistoricalVector>;

pub type RecentRoots<P> = ContiguousVector<H256, SlotsPerHistoricalRoot<P>>;

pub type Slashings<P> = ContiguousVector<Gwei, <P as Preset>::EpochsPerSlashingsVector>;

pub type Validators<P> = ContiguousList<Validator, <P as Preset>::ValidatorRegistryLimit>;
