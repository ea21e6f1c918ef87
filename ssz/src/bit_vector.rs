use core::marker::PhantomData;

use bitvec::{order::Lsb0, vec::BitVec};
use derivative::Derivative;
use derive_more::{Deref, DerefMut};
use ethereum_types::H256;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use typenum::{Unsigned, U1};

use crate::{error::ReadError, merkle_tree, porcelain::SszHash};

/// A bitfield of exactly `N` bits.
#[derive(Deref, DerefMut, Derivative)]
#[derivative(Clone(bound = ""), PartialEq(bound = ""), Eq(bound = ""), Debug(bound = ""))]
pub struct BitVector<N> {
    #[deref(forward)]
    #[deref_mut(forward)]
    bits: BitVec<u8, Lsb0>,
    #[derivative(Debug = "ignore")]
    phantom: PhantomData<N>,
}

impl<N: Unsigned> Default for BitVector<N> {
    fn default() -> Self {
        Self {
            bits: BitVec::repeat(false, N::USIZE),
            phantom: PhantomData,
        }
    }
}

impl<N: Unsigned> BitVector<N> {
    pub fn from_bits(bits: impl IntoIterator<Item = bool>) -> Result<Self, ReadError> {
        let bits = bits.into_iter().collect::<BitVec<u8, Lsb0>>();
        let expected = N::USIZE;
        let actual = bits.len();

        if actual != expected {
            return Err(ReadError::BitVectorSizeMismatch { expected, actual });
        }

        Ok(Self {
            bits,
            phantom: PhantomData,
        })
    }

    /// Moves every bit `amount` positions toward the end. Bits shifted past the end are lost
    /// and the vacated low positions are cleared.
    pub fn shift_up(&mut self, amount: usize) {
        self.bits.shift_right(amount.min(N::USIZE));
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bits = self.bits.clone();
        bits.set_uninitialized(false);
        bits.into_vec()
    }
}

impl<N: Unsigned> SszHash for BitVector<N> {
    type PackingFactor = U1;

    fn hash_tree_root(&self) -> H256 {
        let depth = merkle_tree::depth_for_bits::<N>();
        merkle_tree::merkleize_bytes(&self.to_bytes(), depth)
    }
}

impl<N: Unsigned> Serialize for BitVector<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.to_bytes())))
    }
}

impl<'de, N: Unsigned> Deserialize<'de> for BitVector<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let string = String::deserialize(deserializer)?;
        let digits = string.strip_prefix("0x").unwrap_or(&string);
        let bytes = hex::decode(digits).map_err(D::Error::custom)?;

        let mut bits = BitVec::<u8, Lsb0>::from_vec(bytes);

        if bits.len() < N::USIZE || bits[N::USIZE..].any() {
            return Err(D::Error::custom(ReadError::BitVectorSizeMismatch {
                expected: N::USIZE,
                actual: bits.last_one().map_or(bits.len(), |index| index + 1),
            }));
        }

        bits.truncate(N::USIZE);

        Ok(Self {
            bits,
            phantom: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use typenum::U4;

    use super::*;

    #[test]
    fn shift_up_drops_the_highest_bits() -> Result<(), ReadError> {
        let mut bits = BitVector::<U4>::from_bits([true, false, true, true])?;

        bits.shift_up(1);

        assert_eq!(bits, BitVector::from_bits([false, true, false, true])?);

        Ok(())
    }

    #[test]
    fn serializes_as_hex() -> Result<(), ReadError> {
        let bits = BitVector::<U4>::from_bits([true, true, false, false])?;
        let json = serde_json::to_string(&bits).expect("serialization succeeds");

        assert_eq!(json, r#""0x03""#);
        assert_eq!(
            serde_json::from_str::<BitVector<U4>>(&json).expect("deserialization succeeds"),
            bits,
        );

        Ok(())
    }

    #[test]
    fn root_is_the_padded_byte() -> Result<(), ReadError> {
        let bits = BitVector::<U4>::from_bits([false, true, false, true])?;

        let mut expected = H256::zero();
        expected.as_bytes_mut()[0] = 0b1010;

        assert_eq!(bits.hash_tree_root(), expected);

        Ok(())
    }
}
