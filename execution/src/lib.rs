//! Linkchain execution layer.
//!
//! Deterministic transaction admission and execution for a bandwidth-metered
//! link graph. The primary entrypoint is [App], which sequences
//! `begin_block → deliver_tx* → end_block → commit` over a [store::Store].
//!
//! ## Determinism requirements
//! - Do not use wall-clock time inside execution; block time comes from the header.
//! - Avoid iteration order of hash-based collections influencing outputs.
//! - Every node must rebuild the same link and rank view after a restart; see
//!   [round_scheduler].
//!
//! ## Minimal block (example)
//! ```rust,ignore
//! use linkchain_execution::{store::Memory, App, AppConfig, Services};
//! use linkchain_types::BlockHeader;
//!
//! # async fn example(genesis: &[u8], tx: &[u8]) -> anyhow::Result<()> {
//! let config = AppConfig::default();
//! let services = Services::new(&config);
//! let mut app = App::open(Memory::default(), config, services)?;
//! app.init_chain(genesis, &[])?;
//! app.begin_block(BlockHeader { height: 1, time_ms: 0 })?;
//! let response = app.deliver_tx(tx);
//! assert!(response.is_ok(), "{}", response.log);
//! app.end_block()?;
//! let app_hash = app.commit().await?;
//! # Ok(())
//! # }
//! ```

pub mod admission;
pub mod app;
pub mod app_hash;
pub mod bandwidth;
pub mod error;
pub mod invariants;
pub mod link;
pub mod rank;
pub mod round_scheduler;
pub mod state;
pub mod store;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

mod layer;

pub use app::{App, AppConfig, EndBlockResponse, Info, Services, TxResponse};
pub use error::{AdmissionError, BlockError, FatalError, SequenceError};
pub use layer::{Delivery, Executor, Runtime};
pub use rank::ComputeUnit;
