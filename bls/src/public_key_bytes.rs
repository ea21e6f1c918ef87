use derive_more::AsRef;
use fixed_hash::construct_fixed_hash;
use impl_serde::impl_fixed_hash_serde;
use ssz::{SszHash, H256};

pub const COMPRESSED_SIZE: usize = 48;

construct_fixed_hash! {
    #[derive(AsRef)]
    pub struct PublicKeyBytes(COMPRESSED_SIZE);
}

impl_fixed_hash_serde!(PublicKeyBytes, COMPRESSED_SIZE);

// `Bytes48` spans two chunks.
impl SszHash for PublicKeyBytes {
    type PackingFactor = ssz::U1;

    #[inline]
    fn hash_tree_root(&self) -> H256 {
        ssz::merkleize_bytes(self.as_bytes(), 1)
    }
}
