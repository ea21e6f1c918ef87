use core::{fmt::Debug, marker::PhantomData};

use derivative::Derivative;
use derive_more::{Deref, DerefMut};
use ethereum_types::H256;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use typenum::{NonZero, Unsigned, U1};

use crate::{error::ReadError, merkle_tree, porcelain::SszHash};

/// A sequence of exactly `N` elements.
///
/// Elements live on the heap. `N` can be large for the ring buffers in `BeaconState`.
#[derive(Deref, DerefMut, Derivative, Serialize)]
#[derivative(
    Clone(bound = "T: Clone"),
    PartialEq(bound = "T: PartialEq"),
    Eq(bound = "T: Eq"),
    Debug(bound = "T: Debug", transparent = "true")
)]
#[serde(transparent)]
pub struct ContiguousVector<T, N> {
    #[deref(forward)]
    #[deref_mut(forward)]
    elements: Box<[T]>,
    #[derivative(Debug = "ignore")]
    #[serde(skip)]
    phantom: PhantomData<N>,
}

impl<T: Clone + Default, N: Unsigned> Default for ContiguousVector<T, N> {
    fn default() -> Self {
        Self::repeat_element(T::default())
    }
}

impl<T, N> AsRef<[T]> for ContiguousVector<T, N> {
    fn as_ref(&self) -> &[T] {
        &self.elements
    }
}

impl<T, N: Unsigned> TryFrom<Vec<T>> for ContiguousVector<T, N> {
    type Error = ReadError;

    fn try_from(elements: Vec<T>) -> Result<Self, Self::Error> {
        let expected = N::USIZE;
        let actual = elements.len();

        if actual != expected {
            return Err(ReadError::VectorSizeMismatch { expected, actual });
        }

        Ok(Self {
            elements: elements.into_boxed_slice(),
            phantom: PhantomData,
        })
    }
}

impl<'vector, T, N> IntoIterator for &'vector ContiguousVector<T, N> {
    type Item = &'vector T;
    type IntoIter = core::slice::Iter<'vector, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

impl<'vector, T, N> IntoIterator for &'vector mut ContiguousVector<T, N> {
    type Item = &'vector mut T;
    type IntoIter = core::slice::IterMut<'vector, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter_mut()
    }
}

impl<'de, T: Deserialize<'de>, N: Unsigned> Deserialize<'de> for ContiguousVector<T, N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::deserialize(deserializer)?
            .try_into()
            .map_err(D::Error::custom)
    }
}

impl<T: SszHash, N: Unsigned> SszHash for ContiguousVector<T, N> {
    type PackingFactor = U1;

    fn hash_tree_root(&self) -> H256 {
        let depth = merkle_tree::depth_for_elements::<T, N>();

        if T::PackingFactor::USIZE == 1 {
            merkle_tree::merkleize_chunks(self.iter().map(SszHash::hash_tree_root), depth)
        } else {
            merkle_tree::merkleize_packed(self, depth)
        }
    }
}

impl<T, N: Unsigned> ContiguousVector<T, N> {
    #[must_use]
    pub fn repeat_element(element: T) -> Self
    where
        T: Clone,
    {
        Self {
            elements: vec![element; N::USIZE].into_boxed_slice(),
            phantom: PhantomData,
        }
    }
}

impl<T, N: Unsigned + NonZero> ContiguousVector<T, N> {
    /// Indexes the vector as a ring buffer. Used with slots and epochs.
    #[must_use]
    pub fn mod_index(&self, index: u64) -> &T {
        &self.elements[Self::ring_position(index)]
    }

    pub fn mod_index_mut(&mut self, index: u64) -> &mut T {
        &mut self.elements[Self::ring_position(index)]
    }

    fn ring_position(index: u64) -> usize {
        // The remainder is smaller than `N::USIZE`, so it fits in `usize`.
        #[expect(clippy::cast_possible_truncation)]
        let position = (index % N::U64) as usize;

        position
    }
}

#[cfg(test)]
mod tests {
    use typenum::U4;

    use super::*;

    #[test]
    fn mod_index_wraps_around() {
        let mut vector = ContiguousVector::<u64, U4>::default();

        *vector.mod_index_mut(5) = 9;

        assert_eq!(*vector.mod_index(1), 9);
        assert_eq!(vector.as_ref(), [0, 9, 0, 0]);
    }

    #[test]
    fn construction_requires_exact_length() {
        let result = ContiguousVector::<u64, U4>::try_from(vec![1, 2, 3]);

        assert_eq!(
            result,
            Err(ReadError::VectorSizeMismatch {
                expected: 4,
                actual: 3,
            }),
        );
    }

    #[test]
    fn vector_of_u64_is_packed() -> Result<(), ReadError> {
        let vector = ContiguousVector::<u64, U4>::try_from(vec![1, 2, 3, 4])?;

        let mut chunk = H256::zero();

        for (index, value) in [1_u64, 2, 3, 4].into_iter().enumerate() {
            chunk[index * 8..index * 8 + 8].copy_from_slice(&value.to_le_bytes());
        }

        assert_eq!(vector.hash_tree_root(), chunk);

        Ok(())
    }
}
