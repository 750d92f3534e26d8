use crate::error::GovernorError;

/// Bandwidth spent by the block being delivered.
///
/// Only delivery mutates the governor; mempool checks may read it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockGovernor {
    spent: u64,
    max: u64,
}

impl BlockGovernor {
    pub fn new(max: u64) -> Self {
        Self { spent: 0, max }
    }

    pub fn spent_so_far(&self) -> u64 {
        self.spent
    }

    pub fn max_allowed(&self) -> u64 {
        self.max
    }

    /// Whether `cost` can be added without passing the maximum.
    pub fn fits(&self, cost: u64) -> bool {
        self.spent
            .checked_add(cost)
            .is_some_and(|total| total <= self.max)
    }

    pub fn add(&mut self, cost: u64) -> Result<(), GovernorError> {
        if !self.fits(cost) {
            return Err(GovernorError::Exceeded {
                spent: self.spent,
                cost,
                max: self.max,
            });
        }
        self.spent += cost;
        Ok(())
    }

    /// Start a new block.
    pub fn reset(&mut self) {
        self.spent = 0;
    }

    pub fn set_max(&mut self, max: u64) {
        self.max = max;
    }
}
