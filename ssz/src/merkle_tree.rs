use arithmetic::UsizeExt as _;
use ethereum_types::H256;
use hashing::ZERO_HASHES;
use itertools::Itertools as _;
use typenum::Unsigned;

use crate::porcelain::SszHash;

const BYTES_PER_CHUNK: usize = H256::len_bytes();
const BITS_PER_CHUNK: usize = BYTES_PER_CHUNK * 8;

/// Computes the root of a tree of height `depth` whose leftmost leaves are `chunks`.
///
/// Missing leaves are zero. Subtrees consisting entirely of zero leaves are never hashed.
#[must_use]
pub fn merkleize_chunks(chunks: impl IntoIterator<Item = H256>, depth: u8) -> H256 {
    let depth = usize::from(depth);
    let mut layer = chunks.into_iter().collect_vec();

    debug_assert!(depth >= usize::BITS as usize || layer.len() <= 1 << depth);

    if layer.is_empty() {
        return ZERO_HASHES[depth];
    }

    for height in 0..depth {
        if layer.len() % 2 == 1 {
            layer.push(ZERO_HASHES[height]);
        }

        layer = layer
            .into_iter()
            .tuples()
            .map(|(left, right)| hashing::hash_256_256(left, right))
            .collect();
    }

    layer.first().copied().unwrap_or(ZERO_HASHES[depth])
}

/// Packs basic values into chunks before merkleizing them.
#[must_use]
pub fn merkleize_packed<T: SszHash>(values: &[T], depth: u8) -> H256 {
    let bytes_per_value = BYTES_PER_CHUNK / T::PackingFactor::USIZE;

    let chunks = values.chunks(T::PackingFactor::USIZE).map(|group| {
        let mut chunk = H256::zero();

        for (slot, value) in chunk
            .as_bytes_mut()
            .chunks_exact_mut(bytes_per_value)
            .zip(group)
        {
            slot.copy_from_slice(&value.hash_tree_root()[..bytes_per_value]);
        }

        chunk
    });

    merkleize_chunks(chunks, depth)
}

/// Merkleizes raw bytes, such as the packed bits of a bitfield.
#[must_use]
pub fn merkleize_bytes(bytes: &[u8], depth: u8) -> H256 {
    let chunks = bytes.chunks(BYTES_PER_CHUNK).map(|piece| {
        let mut chunk = H256::zero();
        chunk[..piece.len()].copy_from_slice(piece);
        chunk
    });

    merkleize_chunks(chunks, depth)
}

/// [`mix_in_length`](https://github.com/ethereum/consensus-specs/blob/v0.12.1/ssz/simple-serialize.md#merkleization)
#[must_use]
pub fn mix_in_length(root: H256, length: usize) -> H256 {
    let mut length_chunk = H256::zero();
    length_chunk[..size_of::<u64>()].copy_from_slice(&(length as u64).to_le_bytes());
    hashing::hash_256_256(root, length_chunk)
}

/// Depth of the tree holding up to `N` values of type `T`.
pub(crate) fn depth_for_elements<T: SszHash, N: Unsigned>() -> u8 {
    N::USIZE
        .div_ceil(T::PackingFactor::USIZE)
        .ilog2_ceil()
}

/// Depth of the tree holding up to `N` bits.
pub(crate) fn depth_for_bits<N: Unsigned>() -> u8 {
    N::USIZE.div_ceil(BITS_PER_CHUNK).ilog2_ceil()
}

/// A tree that keeps its leaves and can produce inclusion proofs for them.
///
/// Used for the deposit contract tree, which is small compared to its height.
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct MerkleTree {
    depth: u8,
    leaves: Vec<H256>,
}

impl MerkleTree {
    #[must_use]
    pub const fn new(depth: u8) -> Self {
        Self {
            depth,
            leaves: Vec::new(),
        }
    }

    pub fn push(&mut self, leaf: H256) {
        self.leaves.push(leaf);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    #[must_use]
    pub fn root(&self) -> H256 {
        merkleize_chunks(self.leaves.iter().copied(), self.depth)
    }

    /// Root of the tree with the number of leaves mixed in, as used by list roots.
    #[must_use]
    pub fn root_with_length(&self) -> H256 {
        mix_in_length(self.root(), self.len())
    }

    /// Sibling hashes from the leaf at `index` up to the root, followed by the length chunk.
    ///
    /// The result verifies against [`MerkleTree::root_with_length`] at depth `depth + 1`.
    #[must_use]
    pub fn proof_with_length(&self, index: usize) -> Vec<H256> {
        let depth = usize::from(self.depth);
        let mut proof = Vec::with_capacity(depth + 1);
        let mut layer = self.leaves.clone();
        let mut position = index;

        for height in 0..depth {
            let sibling = layer
                .get(position ^ 1)
                .copied()
                .unwrap_or(ZERO_HASHES[height]);

            proof.push(sibling);

            if layer.len() % 2 == 1 {
                layer.push(ZERO_HASHES[height]);
            }

            layer = layer
                .into_iter()
                .tuples()
                .map(|(left, right)| hashing::hash_256_256(left, right))
                .collect();

            position /= 2;
        }

        let mut length_chunk = H256::zero();
        length_chunk[..size_of::<u64>()].copy_from_slice(&(self.len() as u64).to_le_bytes());
        proof.push(length_chunk);

        proof
    }
}
