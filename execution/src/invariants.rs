//! Periodic consistency checks over the deliver context.
//!
//! A failure means the node's state can no longer be trusted and is fatal.

use crate::{
    bandwidth::{load_recovering, BlockGovernor},
    error::FatalError,
    state::{load_bandwidth, load_link_count, ReadState},
};
use commonware_utils::hex;
use linkchain_types::Link;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvariantChecker {
    period: u64,
}

impl InvariantChecker {
    /// Check every `period` blocks (0 disables checks).
    pub fn new(period: u64) -> Self {
        Self { period }
    }

    pub fn is_due(&self, height: u64) -> bool {
        self.period > 0 && height % self.period == 0
    }

    pub fn check<S: ReadState + ?Sized>(
        &self,
        state: &S,
        governor: &BlockGovernor,
        links: &[Link],
        height: u64,
    ) -> Result<(), FatalError> {
        let broken = |reason: String| FatalError::InvariantBroken { height, reason };

        if governor.spent_so_far() > governor.max_allowed() {
            return Err(broken(format!(
                "block spent {} exceeds max {}",
                governor.spent_so_far(),
                governor.max_allowed()
            )));
        }

        let recovering = load_recovering(state).map_err(|err| broken(format!("{err:#}")))?;
        for account in &recovering {
            let bandwidth = load_bandwidth(state, account)
                .map_err(|err| broken(format!("{err:#}")))?
                .ok_or_else(|| {
                    broken(format!(
                        "recovering account {} has no bandwidth",
                        hex(account.as_ref())
                    ))
                })?;
            if bandwidth.remaining > bandwidth.capacity {
                return Err(broken(format!(
                    "account {} holds {} over capacity {}",
                    hex(account.as_ref()),
                    bandwidth.remaining,
                    bandwidth.capacity
                )));
            }
        }

        let stored = load_link_count(state).map_err(|err| broken(format!("{err:#}")))?;
        if stored != links.len() as u64 {
            return Err(broken(format!(
                "link index holds {} links, state counts {stored}",
                links.len()
            )));
        }

        debug!(height, recovering = recovering.len(), links = stored, "invariants hold");
        Ok(())
    }
}
