//! Shared memoization of shuffled validator indices.
//!
//! Committees for an epoch are slices of one shuffled permutation of the active validators.
//! The permutation only depends on the seed and the active set, so states that agree on both
//! can share it. Copies of a state share the same [`Cache`].

use core::num::NonZeroUsize;
use std::sync::Arc;

use anyhow::Result;
use lru::LruCache;
use nonzero_ext::nonzero;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::phase0::primitives::{ValidatorIndex, H256};

type Shuffling = Arc<[ValidatorIndex]>;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ShufflingKey {
    seed: H256,
    active_indices_digest: H256,
}

pub type ShufflingCache = Mutex<LruCache<ShufflingKey, Arc<OnceCell<Shuffling>>>>;

/// Handle to a [`ShufflingCache`]. Clones share the underlying cache.
#[derive(Clone, Debug)]
pub struct Cache {
    shufflings: Arc<ShufflingCache>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::with_capacity(nonzero!(64_usize))
    }
}

impl Cache {
    #[must_use]
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            shufflings: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Returns the permutation of `active_indices` produced by `shuffle`, computing it at most
    /// once per distinct seed and active set.
    ///
    /// The lock is only held while looking up the entry. Concurrent callers asking for the same
    /// shuffling wait for whichever of them computes it first.
    pub fn shuffled_indices(
        &self,
        seed: H256,
        active_indices: &[ValidatorIndex],
        shuffle: impl FnOnce(&mut [ValidatorIndex]) -> Result<()>,
    ) -> Result<Shuffling> {
        let key = ShufflingKey {
            seed,
            active_indices_digest: digest(active_indices),
        };

        let cell = Arc::clone(self.shufflings.lock().get_or_insert(key, Arc::default));

        cell.get_or_try_init(|| {
            let mut indices = active_indices.to_vec();
            shuffle(&mut indices)?;
            Ok(indices.into())
        })
        .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shufflings.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn digest(indices: &[ValidatorIndex]) -> H256 {
    let bytes = indices
        .iter()
        .flat_map(|index| index.to_le_bytes())
        .collect::<Vec<_>>();

    hashing::hash_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn shuffling_is_computed_once_per_key() -> Result<()> {
        let cache = Cache::default();
        let calls = AtomicUsize::new(0);

        let shuffle = |indices: &mut [ValidatorIndex]| {
            calls.fetch_add(1, Ordering::SeqCst);
            indices.reverse();
            Ok(())
        };

        let first = cache.shuffled_indices(H256::zero(), &[1, 2, 3], shuffle)?;
        let second = cache.shuffled_indices(H256::zero(), &[1, 2, 3], shuffle)?;

        assert_eq!(first.as_ref(), [3, 2, 1]);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        Ok(())
    }

    #[test]
    fn different_active_sets_are_cached_separately() -> Result<()> {
        let cache = Cache::default();

        let a = cache.shuffled_indices(H256::zero(), &[1, 2], |_| Ok(()))?;
        let b = cache.shuffled_indices(H256::zero(), &[1, 2, 3], |_| Ok(()))?;

        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);

        Ok(())
    }

    #[test]
    fn failed_computation_is_retried() {
        let cache = Cache::default();

        let failed = cache.shuffled_indices(H256::zero(), &[1], |_| anyhow::bail!("failure"));
        let succeeded = cache.shuffled_indices(H256::zero(), &[1], |_| Ok(()));

        assert!(failed.is_err());
        assert!(succeeded.is_ok());
    }

    #[test]
    fn least_recently_used_entry_is_evicted() -> Result<()> {
        let cache = Cache::with_capacity(nonzero!(1_usize));

        cache.shuffled_indices(H256::zero(), &[1], |_| Ok(()))?;
        cache.shuffled_indices(H256::repeat_byte(1), &[1], |_| Ok(()))?;

        assert_eq!(cache.len(), 1);

        Ok(())
    }
}
