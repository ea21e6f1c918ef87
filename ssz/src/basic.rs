use ethereum_types::{H256, H32};
use typenum::{U1, U32, U4};

use crate::porcelain::SszHash;

impl SszHash for bool {
    type PackingFactor = U32;

    #[inline]
    fn hash_tree_root(&self) -> H256 {
        u8::from(*self).hash_tree_root()
    }
}

impl SszHash for u8 {
    type PackingFactor = U32;

    #[inline]
    fn hash_tree_root(&self) -> H256 {
        let mut hash = H256::zero();
        hash.as_bytes_mut()[0] = *self;
        hash
    }
}

impl SszHash for u64 {
    type PackingFactor = U4;

    #[inline]
    fn hash_tree_root(&self) -> H256 {
        let mut hash = H256::zero();
        hash[..size_of::<Self>()].copy_from_slice(&self.to_le_bytes());
        hash
    }
}

impl SszHash for H256 {
    type PackingFactor = U1;

    #[inline]
    fn hash_tree_root(&self) -> H256 {
        *self
    }
}

// `Bytes4` in the consensus containers. Its root is the bytes padded to a full chunk.
impl SszHash for H32 {
    type PackingFactor = U1;

    #[inline]
    fn hash_tree_root(&self) -> H256 {
        let mut hash = H256::zero();
        hash[..Self::len_bytes()].copy_from_slice(self.as_bytes());
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u64_root_is_little_endian_padded() {
        let root = 0x0102_u64.hash_tree_root();

        assert_eq!(root[0], 0x02);
        assert_eq!(root[1], 0x01);
        assert!(root[2..].iter().all(|byte| *byte == 0));
    }

    #[test]
    fn bool_root_matches_u8_root() {
        assert_eq!(true.hash_tree_root(), 1_u8.hash_tree_root());
        assert_eq!(false.hash_tree_root(), H256::zero());
    }
}
