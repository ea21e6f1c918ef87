use ethereum_types::H256;
use typenum::{NonZero, Unsigned};

/// [`hash_tree_root`](https://github.com/ethereum/consensus-specs/blob/v0.12.1/ssz/simple-serialize.md#merkleization)
///
/// Basic types are packed into chunks when stored in lists and vectors.
/// `PackingFactor` is the number of values that fit in one 32-byte chunk.
/// The root of a basic value is its little-endian encoding padded with zeros,
/// so the first `32 / PackingFactor` bytes of the root are the packed representation.
pub trait SszHash {
    type PackingFactor: Unsigned + NonZero;

    fn hash_tree_root(&self) -> H256;
}

impl<T: SszHash> SszHash for &T {
    type PackingFactor = T::PackingFactor;

    #[inline]
    fn hash_tree_root(&self) -> H256 {
        (*self).hash_tree_root()
    }
}

impl<T: SszHash> SszHash for Box<T> {
    type PackingFactor = T::PackingFactor;

    #[inline]
    fn hash_tree_root(&self) -> H256 {
        self.as_ref().hash_tree_root()
    }
}

impl<T: SszHash> SszHash for std::sync::Arc<T> {
    type PackingFactor = T::PackingFactor;

    #[inline]
    fn hash_tree_root(&self) -> H256 {
        self.as_ref().hash_tree_root()
    }
}
