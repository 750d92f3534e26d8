//! Rank round scheduling.
//!
//! Rank is recalculated every `period` blocks. After a restart the rank and
//! link subsystems are rebuilt from the state as it was at the last round
//! boundary, so that every node reconstructs exactly the same in-memory view.
//!
//! ## Boundary
//!
//! `boundary(h) = floor(h / P) * P`, except that a node which has committed
//! at least one block but not yet reached the first round reads from block 1
//! (there is no committed state at height 0 once a block exists).
//!
//! ```rust
//! use linkchain_execution::round_scheduler::boundary_for;
//! use std::num::NonZeroU64;
//!
//! let period = NonZeroU64::new(10).unwrap();
//! assert_eq!(boundary_for(0, period), 0);
//! assert_eq!(boundary_for(7, period), 1);
//! assert_eq!(boundary_for(25, period), 20);
//! ```

use crate::{error::FatalError, state::ReadState, store::Store};
use std::num::NonZeroU64;
use tracing::info;

/// Round boundary for a node whose last committed block is `height`.
pub fn boundary_for(height: u64, period: NonZeroU64) -> u64 {
    let boundary = (height / period.get()) * period.get();
    if boundary == 0 && height >= 1 {
        1
    } else {
        boundary
    }
}

/// Read-only view of `store` at `boundary`. Failure is fatal: without it the
/// node cannot rebuild the same subsystem state as its peers.
pub fn build_snapshot<S: Store + ?Sized>(
    store: &S,
    boundary: u64,
) -> Result<Box<dyn ReadState + '_>, FatalError> {
    let snapshot = store
        .snapshot(boundary)
        .map_err(|source| FatalError::UnreconstructableSnapshot { boundary, source })?;
    info!(boundary, height = store.height(), "built round snapshot");
    Ok(snapshot)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundScheduler {
    period: NonZeroU64,
}

impl RoundScheduler {
    pub fn new(period: NonZeroU64) -> Self {
        Self { period }
    }

    pub fn period(&self) -> NonZeroU64 {
        self.period
    }

    pub fn boundary(&self, height: u64) -> u64 {
        boundary_for(height, self.period)
    }

    /// Whether rank is recalculated at the end of block `height`.
    pub fn is_calculation_height(&self, height: u64) -> bool {
        height > 0 && height % self.period.get() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        state::Status,
        store::{Memory, Store},
    };
    use commonware_runtime::{deterministic, Runner};
    use linkchain_types::{Key, Value};
    use proptest::prelude::*;

    fn period(value: u64) -> NonZeroU64 {
        NonZeroU64::new(value).unwrap()
    }

    #[test]
    fn test_boundary_examples() {
        // Nothing committed yet
        assert_eq!(boundary_for(0, period(5)), 0);

        // Before the first round the boundary is block 1
        assert_eq!(boundary_for(1, period(5)), 1);
        assert_eq!(boundary_for(4, period(5)), 1);

        // Exactly on and past a round
        assert_eq!(boundary_for(5, period(5)), 5);
        assert_eq!(boundary_for(9, period(5)), 5);
        assert_eq!(boundary_for(10, period(5)), 10);

        // Every block is a round
        assert_eq!(boundary_for(7, period(1)), 7);
    }

    #[test]
    fn test_calculation_heights() {
        let scheduler = RoundScheduler::new(period(3));
        assert!(!scheduler.is_calculation_height(0));
        assert!(!scheduler.is_calculation_height(2));
        assert!(scheduler.is_calculation_height(3));
        assert!(scheduler.is_calculation_height(9));
        assert_eq!(scheduler.boundary(8), 6);
    }

    #[test]
    fn test_snapshot_failure_is_fatal() {
        let runner = deterministic::Runner::default();
        runner.start(|_| async move {
            let mut store = Memory::default();
            for height in 1..=6 {
                store
                    .commit(
                        height,
                        vec![(Key::LinkCount, Status::Update(Value::LinkCount(height)))],
                    )
                    .await
                    .unwrap();
            }
            let snapshot = build_snapshot(&store, 5).unwrap();
            assert_eq!(snapshot.get(&Key::LinkCount).unwrap(), Some(Value::LinkCount(5)));
            drop(snapshot);

            store.prune(6).await.unwrap();
            assert!(matches!(
                build_snapshot(&store, 5),
                Err(FatalError::UnreconstructableSnapshot { boundary: 5, .. })
            ));
        });
    }

    proptest! {
        #[test]
        fn prop_boundary_is_pure(height in 0u64..1_000_000, p in 1u64..10_000) {
            let boundary = boundary_for(height, period(p));
            prop_assert_eq!(boundary, boundary_for(height, period(p)));
            prop_assert!(boundary <= height);
            if height == 0 {
                prop_assert_eq!(boundary, 0);
            } else if height < p {
                prop_assert_eq!(boundary, 1);
            } else {
                prop_assert_eq!(boundary % p, 0);
                prop_assert!(height - boundary < p);
            }
        }
    }
}
