use commonware_codec::EncodeSize;
use linkchain_types::{params::PRICE_DENOMINATOR, BandwidthParams, Transaction};

/// Apply the credit price (permille) to a raw amount, saturating at `u64::MAX`.
pub fn price(raw: u64, params: &BandwidthParams) -> u64 {
    let priced = raw as u128 * params.credit_price as u128 / PRICE_DENOMINATOR as u128;
    u64::try_from(priced).unwrap_or(u64::MAX)
}

/// Pure pricing of transactions.
///
/// Implementations must depend only on their arguments: check and deliver
/// price the same transaction independently and must agree.
pub trait CostOracle: Send + Sync {
    /// Cost known before execution, from transaction content alone.
    fn base_cost(&self, tx: &Transaction, params: &BandwidthParams) -> u64;

    /// Extra cost of the edges a successful delivery created.
    fn linking_cost(&self, new_links: u64, params: &BandwidthParams) -> u64;
}

/// Flat per-transaction, per-message and per-byte pricing.
#[derive(Clone, Copy, Debug, Default)]
pub struct MessageCostOracle;

impl CostOracle for MessageCostOracle {
    fn base_cost(&self, tx: &Transaction, params: &BandwidthParams) -> u64 {
        let messages = tx.messages.iter().fold(0u64, |total, message| {
            let cost = if message.is_linking() {
                params.link_msg_cost
            } else {
                params.non_link_msg_cost
            };
            total.saturating_add(cost)
        });
        let bytes = params.byte_cost.saturating_mul(tx.encode_size() as u64);
        price(
            params.tx_cost.saturating_add(messages).saturating_add(bytes),
            params,
        )
    }

    fn linking_cost(&self, new_links: u64, params: &BandwidthParams) -> u64 {
        price(params.link_cost.saturating_mul(new_links), params)
    }
}
