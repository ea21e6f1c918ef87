use core::num::NonZeroUsize;

use derivative::Derivative;
use nonzero_ext::nonzero;
use transition_functions::phase0::StateRootPolicy;

#[derive(Clone, Copy, Debug, Derivative)]
#[derivative(Default)]
pub struct StoreConfig {
    /// Number of shufflings kept in the cache shared by all states in a [`Store`].
    ///
    /// [`Store`]: crate::Store
    #[derivative(Default(value = "nonzero!(64_usize)"))]
    pub shuffling_cache_capacity: NonZeroUsize,
    pub state_root_policy: StateRootPolicy,
}

impl StoreConfig {
    /// Configuration for stores that only see blocks built locally, e.g. in simulations.
    #[must_use]
    pub fn trusting() -> Self {
        Self {
            state_root_policy: StateRootPolicy::Trust,
            ..Self::default()
        }
    }
}
