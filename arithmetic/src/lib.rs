use core::num::{NonZeroU64, NonZeroUsize};

use easy_ext::ext;
use typenum::{NonZero, Unsigned};

/// Conversions from type-level capacities to runtime values.
#[ext(NonZeroExt)]
pub impl<N: Unsigned + NonZero> N {
    #[inline]
    #[must_use]
    fn non_zero() -> NonZeroU64 {
        NonZeroU64::new(Self::U64).unwrap_or(NonZeroU64::MIN)
    }

    /// Depth of a Merkle tree with `N` leaves, rounded up.
    #[inline]
    #[must_use]
    fn depth() -> u8 {
        Self::USIZE.ilog2_ceil()
    }
}

#[ext(UsizeExt)]
pub impl usize {
    #[inline]
    #[must_use]
    fn is_multiple_of(self, factor: NonZeroUsize) -> bool {
        self % factor == 0
    }

    #[inline]
    #[must_use]
    fn div_typenum<N: Unsigned + NonZero>(self) -> Self {
        self / N::USIZE
    }

    #[inline]
    #[must_use]
    fn ilog2_ceil(self) -> u8 {
        let bits = self
            .checked_next_power_of_two()
            .map_or(Self::BITS, Self::trailing_zeros);

        // `usize::BITS` is at most 128.
        #[expect(clippy::cast_possible_truncation)]
        let bits = bits as u8;

        bits
    }
}

#[ext(U64Ext)]
pub impl u64 {
    #[inline]
    #[must_use]
    fn is_multiple_of(self, factor: NonZeroU64) -> bool {
        self % factor == 0
    }

    #[inline]
    #[must_use]
    fn prev_multiple_of(self, factor: NonZeroU64) -> Self {
        self - self % factor
    }

    #[inline]
    #[must_use]
    fn div_typenum<N: Unsigned + NonZero>(self) -> Self {
        self / N::U64
    }

    #[inline]
    #[must_use]
    fn mod_typenum<N: Unsigned + NonZero>(self) -> Self {
        self % N::U64
    }

    /// Computes `self * numerator / denominator` without intermediate overflow.
    #[inline]
    #[must_use]
    fn mul_div(self, numerator: Self, denominator: NonZeroU64) -> Self {
        let product = u128::from(self) * u128::from(numerator);
        let quotient = product / u128::from(denominator.get());
        Self::try_from(quotient).unwrap_or(Self::MAX)
    }
}
