use core::{fmt::Debug, marker::PhantomData};

use derivative::Derivative;
use derive_more::{Deref, DerefMut};
use ethereum_types::H256;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use typenum::{Unsigned, U1};

use crate::{
    error::{IndexError, PushError, ReadError},
    merkle_tree,
    porcelain::SszHash,
};

/// A list with at most `N` elements.
///
/// The limit is checked whenever the list is constructed or grows.
#[derive(Deref, DerefMut, Derivative, Serialize)]
#[derivative(
    Clone(bound = "T: Clone"),
    PartialEq(bound = "T: PartialEq"),
    Eq(bound = "T: Eq"),
    Hash(bound = "T: core::hash::Hash"),
    Default(bound = ""),
    Debug(bound = "T: Debug", transparent = "true")
)]
#[serde(transparent)]
pub struct ContiguousList<T, N> {
    // Dereferencing to the slice rather than the `Vec` keeps `Vec::push` out of reach.
    #[deref(forward)]
    #[deref_mut(forward)]
    elements: Vec<T>,
    #[derivative(Debug = "ignore", Hash = "ignore")]
    #[serde(skip)]
    phantom: PhantomData<N>,
}

impl<T, N> AsRef<[T]> for ContiguousList<T, N> {
    fn as_ref(&self) -> &[T] {
        self.elements.as_slice()
    }
}

impl<T, N: Unsigned> TryFrom<Vec<T>> for ContiguousList<T, N> {
    type Error = ReadError;

    fn try_from(elements: Vec<T>) -> Result<Self, Self::Error> {
        Self::validate_length(elements.len())?;
        Ok(Self::new_unchecked(elements))
    }
}

impl<T, N> IntoIterator for ContiguousList<T, N> {
    type Item = T;
    type IntoIter = <Vec<T> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.into_iter()
    }
}

impl<'list, T, N> IntoIterator for &'list ContiguousList<T, N> {
    type Item = &'list T;
    type IntoIter = core::slice::Iter<'list, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

impl<'list, T, N> IntoIterator for &'list mut ContiguousList<T, N> {
    type Item = &'list mut T;
    type IntoIter = core::slice::IterMut<'list, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter_mut()
    }
}

impl<'de, T: Deserialize<'de>, N: Unsigned> Deserialize<'de> for ContiguousList<T, N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::deserialize(deserializer)?
            .try_into()
            .map_err(D::Error::custom)
    }
}

impl<T: SszHash, N: Unsigned> SszHash for ContiguousList<T, N> {
    type PackingFactor = U1;

    fn hash_tree_root(&self) -> H256 {
        let depth = merkle_tree::depth_for_elements::<T, N>();

        let root = if T::PackingFactor::USIZE == 1 {
            merkle_tree::merkleize_chunks(self.iter().map(SszHash::hash_tree_root), depth)
        } else {
            merkle_tree::merkleize_packed(self, depth)
        };

        merkle_tree::mix_in_length(root, self.len())
    }
}

impl<T, N: Unsigned> ContiguousList<T, N> {
    pub fn try_from_iter(elements: impl IntoIterator<Item = T>) -> Result<Self, ReadError> {
        elements.into_iter().collect::<Vec<_>>().try_into()
    }

    pub fn push(&mut self, element: T) -> Result<(), PushError> {
        if self.elements.len() >= N::USIZE {
            return Err(PushError::ListFull {
                capacity: N::USIZE,
            });
        }

        self.elements.push(element);

        Ok(())
    }

    /// Looks up an element by a consensus index such as a `ValidatorIndex`.
    pub fn get(&self, index: u64) -> Result<&T, IndexError> {
        let index = Self::convert_index(index)?;
        let length = self.elements.len();

        self.elements
            .get(index)
            .ok_or(IndexError::OutOfBounds { length, index })
    }

    pub fn get_mut(&mut self, index: u64) -> Result<&mut T, IndexError> {
        let index = Self::convert_index(index)?;
        let length = self.elements.len();

        self.elements
            .get_mut(index)
            .ok_or(IndexError::OutOfBounds { length, index })
    }

    pub fn len_u64(&self) -> u64 {
        self.elements.len() as u64
    }

    #[must_use]
    pub fn map<U>(self, function: impl FnMut(T) -> U) -> ContiguousList<U, N> {
        ContiguousList::new_unchecked(self.elements.into_iter().map(function).collect())
    }

    const fn validate_length(actual: usize) -> Result<(), ReadError> {
        let maximum = N::USIZE;

        if actual > maximum {
            return Err(ReadError::ListTooLong { maximum, actual });
        }

        Ok(())
    }

    fn convert_index(index: u64) -> Result<usize, IndexError> {
        index
            .try_into()
            .map_err(|_| IndexError::DoesNotFitInUsize { index })
    }

    const fn new_unchecked(elements: Vec<T>) -> Self {
        Self {
            elements,
            phantom: PhantomData,
        }
    }
}
