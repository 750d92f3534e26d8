use linkchain_types::{execution::AccountBandwidth, ModelParams};

/// Versioned mapping from stake to bandwidth capacity, and the regeneration rate.
///
/// Swapping the model (for example at a network upgrade) must not require
/// changes to the ledger or the admission pipeline.
pub trait BandwidthModel: Send + Sync {
    fn version(&self) -> u16;

    /// Full bandwidth of an account holding `stake`.
    fn capacity(&self, stake: u64) -> u64;

    /// Balance after `blocks` blocks of regeneration. Never exceeds capacity.
    fn regenerate(&self, bandwidth: AccountBandwidth, blocks: u64) -> AccountBandwidth;
}

/// Capacity proportional to stake; an empty account refills over
/// `recovery_period` blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinearModel {
    params: ModelParams,
}

impl LinearModel {
    pub const VERSION: u16 = 1;

    pub fn new(params: ModelParams) -> Self {
        Self { params }
    }
}

impl BandwidthModel for LinearModel {
    fn version(&self) -> u16 {
        self.params.version
    }

    fn capacity(&self, stake: u64) -> u64 {
        let scaled = stake as u128 * self.params.capacity_numerator as u128
            / self.params.capacity_denominator.max(1) as u128;
        u64::try_from(scaled).unwrap_or(u64::MAX)
    }

    fn regenerate(&self, mut bandwidth: AccountBandwidth, blocks: u64) -> AccountBandwidth {
        if bandwidth.remaining >= bandwidth.capacity || blocks == 0 {
            bandwidth.remaining = bandwidth.remaining.min(bandwidth.capacity);
            return bandwidth;
        }
        let per_block = (bandwidth.capacity / self.params.recovery_period.max(1)).max(1);
        bandwidth.remaining = bandwidth
            .remaining
            .saturating_add(per_block.saturating_mul(blocks))
            .min(bandwidth.capacity);
        bandwidth
    }
}
