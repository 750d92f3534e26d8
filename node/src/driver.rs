//! Block replay driver.
//!
//! Blocks arrive as JSON lines, one block per line:
//!
//! ```text
//! {"header":{"height":1,"time_ms":0},"txs":["0a0b..."]}
//! ```
//!
//! Every block runs `begin_block → deliver_tx* → end_block → commit`. With
//! `check_before_deliver` each transaction is first offered to the mempool
//! context, mirroring what a proposer would have seen.

use crate::metrics::Metrics;
use anyhow::{Context, Result};
use commonware_utils::hex;
use linkchain_execution::{store::Store, App, TxResponse};
use linkchain_types::{BlockHeader, HexBytes};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use tracing::{debug, info};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    #[serde(default)]
    pub txs: Vec<HexBytes>,
}

/// Parse JSON-lines blocks. Blank lines and `#` comments are skipped.
pub fn read_blocks(reader: impl BufRead) -> Result<Vec<Block>> {
    let mut blocks = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("read block line {}", index + 1))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let block: Block = serde_json::from_str(line)
            .with_context(|| format!("parse block on line {}", index + 1))?;
        blocks.push(block);
    }
    Ok(blocks)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockOutcome {
    pub height: u64,
    pub app_hash: Vec<u8>,
    pub accepted: usize,
    pub rejected: usize,
}

pub struct Driver<S: Store> {
    app: App<S>,
    metrics: Metrics,
    check_before_deliver: bool,
}

impl<S: Store> Driver<S> {
    pub fn new(app: App<S>, metrics: Metrics, check_before_deliver: bool) -> Self {
        Self {
            app,
            metrics,
            check_before_deliver,
        }
    }

    /// Install genesis unless the store already holds committed blocks.
    pub fn init(&mut self, genesis: &[u8]) -> Result<()> {
        if self.app.height() > 0 {
            info!(height = self.app.height(), "resuming from journal; genesis skipped");
            return Ok(());
        }
        let validators = self
            .app
            .init_chain(genesis, &[])
            .context("init chain")?;
        info!(validators = validators.len(), "genesis installed");
        Ok(())
    }

    /// Run one block. Blocks at or below the committed height are skipped.
    pub async fn apply(&mut self, block: &Block) -> Result<Option<BlockOutcome>> {
        let height = block.header.height;
        if height <= self.app.height() {
            debug!(height, committed = self.app.height(), "block already committed");
            return Ok(None);
        }

        if self.check_before_deliver {
            for tx in &block.txs {
                let response = self.app.check_tx(tx.as_ref());
                self.record("check", &response);
            }
        }

        self.app
            .begin_block(block.header)
            .with_context(|| format!("begin block {height}"))?;
        let mut accepted = 0;
        let mut rejected = 0;
        for tx in &block.txs {
            let response = self.app.deliver_tx(tx.as_ref());
            self.record("deliver", &response);
            self.metrics.record_events(&response.events);
            if response.is_ok() {
                accepted += 1;
            } else {
                rejected += 1;
            }
        }
        let end = self
            .app
            .end_block()
            .with_context(|| format!("end block {height}"))?;
        self.metrics.record_events(&end.events);
        let (spent, _) = self.app.block_bandwidth();
        let app_hash = self
            .app
            .commit()
            .await
            .with_context(|| format!("commit block {height}"))?;
        self.metrics
            .record_block(height, spent, self.app.link_count());
        info!(
            height,
            accepted,
            rejected,
            spent,
            events = end.events.len(),
            app_hash = %hex(&app_hash),
            "block applied"
        );
        Ok(Some(BlockOutcome {
            height,
            app_hash,
            accepted,
            rejected,
        }))
    }

    /// Apply blocks in order, stopping at the first fatal error.
    pub async fn run(&mut self, blocks: &[Block]) -> Result<Vec<BlockOutcome>> {
        let mut outcomes = Vec::new();
        for block in blocks {
            if let Some(outcome) = self.apply(block).await? {
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    fn record(&self, mode: &str, response: &TxResponse) {
        self.metrics.record_tx(mode, response.code);
        if !response.is_ok() {
            debug!(mode, code = response.code, log = %response.log, "transaction rejected");
        }
    }

    pub fn app(&self) -> &App<S> {
        &self.app
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
