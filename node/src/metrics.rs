//! Prometheus counters for replayed blocks.
//!
//! The registry is rendered with the text encoder and written out once the
//! driver stops; there is no scrape endpoint.

use anyhow::{Context, Result};
use linkchain_types::Event;
use prometheus_client::{
    encoding::{text::encode, EncodeLabelSet},
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TxLabels {
    pub mode: String,
    pub code: String,
}

impl TxLabels {
    pub fn new(mode: &str, code: u32) -> Self {
        Self {
            mode: mode.to_string(),
            code: code.to_string(),
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EventLabels {
    pub kind: String,
}

pub struct Metrics {
    registry: Registry,
    txs: Family<TxLabels, Counter>,
    events: Family<EventLabels, Counter>,
    blocks: Counter,
    height: Gauge,
    block_bandwidth: Gauge,
    links: Gauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("linkchain");
        let txs = Family::<TxLabels, Counter>::default();
        registry.register(
            "transactions",
            "Transactions processed, by admission mode and response code",
            txs.clone(),
        );
        let events = Family::<EventLabels, Counter>::default();
        registry.register(
            "events",
            "Events emitted by delivered transactions and block ends, by kind",
            events.clone(),
        );
        let blocks = Counter::default();
        registry.register("blocks", "Blocks committed by this process", blocks.clone());
        let height = Gauge::default();
        registry.register("height", "Last committed height", height.clone());
        let block_bandwidth = Gauge::default();
        registry.register(
            "block_bandwidth",
            "Bandwidth spent by the last committed block",
            block_bandwidth.clone(),
        );
        let links = Gauge::default();
        registry.register("links", "Distinct links in the graph", links.clone());
        Self {
            registry,
            txs,
            events,
            blocks,
            height,
            block_bandwidth,
            links,
        }
    }

    pub fn record_tx(&self, mode: &str, code: u32) {
        self.txs.get_or_create(&TxLabels::new(mode, code)).inc();
    }

    pub fn tx_count(&self, mode: &str, code: u32) -> u64 {
        self.txs
            .get(&TxLabels::new(mode, code))
            .map_or(0, |counter| counter.get())
    }

    pub fn record_events(&self, events: &[Event]) {
        for event in events {
            let labels = EventLabels {
                kind: event.kind().to_string(),
            };
            self.events.get_or_create(&labels).inc();
        }
    }

    pub fn event_count(&self, kind: &str) -> u64 {
        let labels = EventLabels {
            kind: kind.to_string(),
        };
        self.events.get(&labels).map_or(0, |counter| counter.get())
    }

    pub fn record_block(&self, height: u64, spent: u64, links: usize) {
        self.blocks.inc();
        self.height.set(height as i64);
        self.block_bandwidth.set(spent as i64);
        self.links.set(links as i64);
    }

    pub fn blocks(&self) -> u64 {
        self.blocks.get()
    }

    pub fn encode(&self) -> Result<String> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry).context("encode Prometheus metrics")?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkchain_execution::mocks::create_account_keypair;

    #[test]
    fn test_encodes_labelled_counters() {
        let metrics = Metrics::new();
        metrics.record_tx("deliver", 0);
        metrics.record_tx("deliver", 0);
        metrics.record_tx("check", 5);
        metrics.record_block(3, 12, 4);

        assert_eq!(metrics.tx_count("deliver", 0), 2);
        assert_eq!(metrics.tx_count("check", 5), 1);
        assert_eq!(metrics.blocks(), 1);

        let text = metrics.encode().unwrap();
        assert!(text.contains("linkchain_transactions_total{mode=\"deliver\",code=\"0\"} 2"));
        assert!(text.contains("linkchain_block_bandwidth 12"));
        assert!(text.contains("linkchain_height 3"));
    }

    #[test]
    fn test_reads_do_not_create_series() {
        let metrics = Metrics::new();
        assert_eq!(metrics.tx_count("deliver", 7), 0);
        assert_eq!(metrics.event_count("transfer"), 0);

        let text = metrics.encode().unwrap();
        assert!(!text.contains("code=\"7\""));
        assert!(!text.contains("kind=\"transfer\""));
    }

    #[test]
    fn test_counts_events_by_kind() {
        let metrics = Metrics::new();
        let (_, account) = create_account_keypair(1);
        metrics.record_events(&[
            Event::BandwidthCharged {
                account: account.clone(),
                amount: 3,
                remaining: 997,
            },
            Event::BandwidthCharged {
                account,
                amount: 3,
                remaining: 994,
            },
            Event::RankCalculated { height: 5, cids: 6 },
        ]);
        assert_eq!(metrics.event_count("bandwidth_charged"), 2);
        assert_eq!(metrics.event_count("rank_calculated"), 1);
        assert!(metrics
            .encode()
            .unwrap()
            .contains("linkchain_events_total{kind=\"bandwidth_charged\"} 2"));
    }
}
