//! Bandwidth metering.
//!
//! Every transaction is priced by a [CostOracle] and paid from the payer's
//! [linkchain_types::AccountBandwidth] through the [BandwidthLedger]. The
//! [BlockGovernor] caps what a single block may spend in total. Credit comes
//! back over time through the [Regenerator], at the rate set by the active
//! [BandwidthModel].

mod cost;
mod governor;
mod ledger;
mod model;
mod recovery;

pub use cost::{price, CostOracle, MessageCostOracle};
pub use governor::BlockGovernor;
pub use ledger::BandwidthLedger;
pub use model::{BandwidthModel, LinearModel};
pub use recovery::{load_recovering, Regenerator};
