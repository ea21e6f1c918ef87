//! The boundary between consensus logic and signature checking.
//!
//! Consensus code never decides whether a signature is valid. It computes the signing root and
//! asks a [`Verifier`].

use anyhow::Result;
use bls::{PublicKeyBytes, SignatureBytes};
use types::phase0::primitives::H256;

use crate::error::SignatureKind;

pub trait Verifier {
    /// `true` for verifiers that accept everything. Lets callers skip computing signing roots.
    const IS_NULL: bool;

    fn verify_singular(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_key: PublicKeyBytes,
        signature_kind: SignatureKind,
    ) -> Result<()>;

    fn verify_aggregate(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_keys: impl IntoIterator<Item = PublicKeyBytes>,
        signature_kind: SignatureKind,
    ) -> Result<()>;
}

impl<V: Verifier> Verifier for &mut V {
    const IS_NULL: bool = V::IS_NULL;

    #[inline]
    fn verify_singular(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_key: PublicKeyBytes,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        (*self).verify_singular(message, signature_bytes, public_key, signature_kind)
    }

    #[inline]
    fn verify_aggregate(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_keys: impl IntoIterator<Item = PublicKeyBytes>,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        (*self).verify_aggregate(message, signature_bytes, public_keys, signature_kind)
    }
}

/// Accepts every signature.
#[derive(Clone, Copy, Default, Debug)]
pub struct NullVerifier;

impl Verifier for NullVerifier {
    const IS_NULL: bool = true;

    #[inline]
    fn verify_singular(
        &mut self,
        _message: H256,
        _signature_bytes: SignatureBytes,
        _public_key: PublicKeyBytes,
        _signature_kind: SignatureKind,
    ) -> Result<()> {
        Ok(())
    }

    #[inline]
    fn verify_aggregate(
        &mut self,
        _message: H256,
        _signature_bytes: SignatureBytes,
        _public_keys: impl IntoIterator<Item = PublicKeyBytes>,
        _signature_kind: SignatureKind,
    ) -> Result<()> {
        Ok(())
    }
}
