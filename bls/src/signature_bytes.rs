use derive_more::AsRef;
use fixed_hash::construct_fixed_hash;
use impl_serde::impl_fixed_hash_serde;
use ssz::{SszHash, H256};

pub const SIGNATURE_SIZE: usize = 96;

construct_fixed_hash! {
    #[derive(AsRef)]
    pub struct SignatureBytes(SIGNATURE_SIZE);
}

impl_fixed_hash_serde!(SignatureBytes, SIGNATURE_SIZE);

impl SszHash for SignatureBytes {
    type PackingFactor = ssz::U1;

    #[inline]
    fn hash_tree_root(&self) -> H256 {
        ssz::merkleize_bytes(self.as_bytes(), 2)
    }
}

impl SignatureBytes {
    /// The compressed point at infinity. Blocks at genesis carry this.
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        let mut bytes = Self::zero();
        bytes.as_mut()[0] = 0xc0;
        bytes
    }

    #[inline]
    #[must_use]
    pub fn is_empty(self) -> bool {
        self == Self::empty()
    }
}
