use core::marker::PhantomData;

use bitvec::{order::Lsb0, vec::BitVec};
use derivative::Derivative;
use derive_more::{Deref, DerefMut};
use ethereum_types::H256;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use typenum::{Unsigned, U1};

use crate::{error::ReadError, merkle_tree, porcelain::SszHash};

/// A bitfield with a variable length of at most `N` bits.
///
/// Dereferences to a `BitSlice`, so individual bits can be read and set but the length
/// cannot change after construction.
#[derive(Deref, DerefMut, Derivative)]
#[derivative(
    Clone(bound = ""),
    PartialEq(bound = ""),
    Eq(bound = ""),
    Default(bound = ""),
    Debug(bound = "")
)]
pub struct BitList<N> {
    #[deref(forward)]
    #[deref_mut(forward)]
    bits: BitVec<u8, Lsb0>,
    #[derivative(Debug = "ignore")]
    phantom: PhantomData<N>,
}

impl<N: Unsigned> BitList<N> {
    /// Creates a list of `length` unset bits.
    pub fn with_length(length: usize) -> Result<Self, ReadError> {
        Self::validate_length(length)?;

        Ok(Self {
            bits: BitVec::repeat(false, length),
            phantom: PhantomData,
        })
    }

    pub fn from_bits(bits: impl IntoIterator<Item = bool>) -> Result<Self, ReadError> {
        let bits = bits.into_iter().collect::<BitVec<u8, Lsb0>>();

        Self::validate_length(bits.len())?;

        Ok(Self {
            bits,
            phantom: PhantomData,
        })
    }

    /// Decodes the SSZ representation, where the highest set bit marks the length.
    pub fn from_delimited_bytes(bytes: &[u8]) -> Result<Self, ReadError> {
        let last_byte = *bytes.last().ok_or(ReadError::BitListEmpty)?;

        if last_byte == 0 {
            return Err(ReadError::BitListNoDelimitingBit);
        }

        let length = (bytes.len() - 1) * 8 + last_byte.ilog2() as usize;

        Self::validate_length(length)?;

        let mut bits = BitVec::<u8, Lsb0>::from_slice(bytes);
        bits.truncate(length);

        Ok(Self {
            bits,
            phantom: PhantomData,
        })
    }

    #[must_use]
    pub fn to_delimited_bytes(&self) -> Vec<u8> {
        let mut bits = self.bits.clone();
        bits.push(true);
        bits.into_vec()
    }

    const fn validate_length(actual: usize) -> Result<(), ReadError> {
        let maximum = N::USIZE;

        if actual > maximum {
            return Err(ReadError::BitListTooLong { maximum, actual });
        }

        Ok(())
    }
}

impl<N: Unsigned> SszHash for BitList<N> {
    type PackingFactor = U1;

    fn hash_tree_root(&self) -> H256 {
        let mut bits = self.bits.clone();
        bits.set_uninitialized(false);

        let depth = merkle_tree::depth_for_bits::<N>();
        let root = merkle_tree::merkleize_bytes(bits.as_raw_slice(), depth);

        merkle_tree::mix_in_length(root, self.len())
    }
}

impl<N: Unsigned> Serialize for BitList<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let bytes = self.to_delimited_bytes();
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }
}

impl<'de, N: Unsigned> Deserialize<'de> for BitList<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let string = String::deserialize(deserializer)?;
        let digits = string.strip_prefix("0x").unwrap_or(&string);
        let bytes = hex::decode(digits).map_err(D::Error::custom)?;

        Self::from_delimited_bytes(&bytes).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use typenum::{U2048, U4, U8};

    use super::*;

    #[test]
    fn delimited_bytes_round_trip_preserves_length() -> Result<(), ReadError> {
        let mut list = BitList::<U8>::with_length(5)?;
        list.set(1, true);
        list.set(4, true);

        let bytes = list.to_delimited_bytes();

        assert_eq!(bytes, [0b0011_0010]);
        assert_eq!(BitList::<U8>::from_delimited_bytes(&bytes)?, list);

        Ok(())
    }

    #[test]
    fn construction_rejects_too_many_bits() {
        assert_eq!(
            BitList::<U4>::with_length(5),
            Err(ReadError::BitListTooLong {
                maximum: 4,
                actual: 5,
            }),
        );

        assert_eq!(
            BitList::<U4>::from_delimited_bytes(&[0]),
            Err(ReadError::BitListNoDelimitingBit),
        );
    }

    #[test]
    fn root_depends_on_length_but_not_on_spare_capacity() -> Result<(), ReadError> {
        let short = BitList::<U2048>::with_length(3)?;
        let long = BitList::<U2048>::with_length(4)?;

        assert_ne!(short.hash_tree_root(), long.hash_tree_root());
        assert_eq!(
            short.hash_tree_root(),
            merkle_tree::mix_in_length(hashing::ZERO_HASHES[3], 3),
        );

        Ok(())
    }
}
