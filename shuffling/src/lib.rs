//! Swap-or-not shuffling.
//!
//! See <https://github.com/ethereum/consensus-specs/blob/v0.12.1/specs/phase0/beacon-chain.md#compute_shuffled_index>
//! and <https://link.springer.com/content/pdf/10.1007%2F978-3-642-32009-5_1.pdf>.

use core::num::NonZeroU64;

use anyhow::Result;
use bit_field::BitArray as _;
use tap::TryConv as _;
use types::{phase0::primitives::H256, preset::Preset};

const BITS_PER_HASH: u64 = 256;

/// Permutes `slice` so that the element at position `i` ends up being the one that was at
/// position [`shuffle_single`]`(i)`.
///
/// Each round is an involution, so applying the rounds to the whole slice in reverse order
/// yields the same permutation as composing [`shuffle_single`] forward.
pub fn shuffle_slice<P: Preset, T>(slice: &mut [T], seed: H256) -> Result<()> {
    let Some(index_count) = NonZeroU64::new(slice.len().try_conv::<u64>()?) else {
        return Ok(());
    };

    for round in (0..P::SHUFFLE_ROUND_COUNT).rev() {
        let pivot = compute_pivot(seed, round, index_count);
        let mut source = SourceWindow::new(seed, round);

        for index in 0..index_count.get() {
            let flip = (pivot + index_count.get() - index) % index_count;

            // Visit every pair once, from its lower member. The higher one is the position.
            if index < flip && source.bit(flip) {
                slice.swap(index.try_conv::<usize>()?, flip.try_conv::<usize>()?);
            }
        }
    }

    Ok(())
}

/// Computes the position that `index` is mapped to in a shuffled list of `index_count` elements.
///
/// Returns `None` if `index` is out of range.
#[must_use]
pub fn shuffle_single<P: Preset>(
    mut index: u64,
    index_count: NonZeroU64,
    seed: H256,
) -> Option<u64> {
    if index >= index_count.get() {
        return None;
    }

    for round in 0..P::SHUFFLE_ROUND_COUNT {
        let pivot = compute_pivot(seed, round, index_count);
        let flip = (pivot + index_count.get() - index) % index_count;
        let position = index.max(flip);

        if SourceWindow::new(seed, round).bit(position) {
            index = flip;
        }
    }

    Some(index)
}

fn compute_pivot(seed: H256, round: u8, index_count: NonZeroU64) -> u64 {
    let hash = hashing::hash_256_8(seed, round);
    let mut bytes = [0; size_of::<u64>()];
    bytes.copy_from_slice(&hash.as_bytes()[..size_of::<u64>()]);
    u64::from_le_bytes(bytes) % index_count
}

// Positions in the same window of 256 share one source hash.
struct SourceWindow {
    seed: H256,
    round: u8,
    cached: Option<(u64, H256)>,
}

impl SourceWindow {
    const fn new(seed: H256, round: u8) -> Self {
        Self {
            seed,
            round,
            cached: None,
        }
    }

    fn bit(&mut self, position: u64) -> bool {
        let window = position / BITS_PER_HASH;

        let source = match self.cached {
            Some((cached_window, source)) if cached_window == window => source,
            _ => {
                // Truncated to 4 bytes like `uint_to_bytes(uint32(position // 256))`.
                #[expect(clippy::cast_possible_truncation)]
                let source = hashing::hash_256_8_32(self.seed, self.round, window as u32);
                self.cached = Some((window, source));
                source
            }
        };

        // The remainder is below 256.
        #[expect(clippy::cast_possible_truncation)]
        let bit_index = (position % BITS_PER_HASH) as usize;

        source.as_bytes().get_bit(bit_index)
    }
}
