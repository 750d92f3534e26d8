//! Wire types, parameter sets and the genesis schema shared by every linkchain crate.

pub mod execution;
pub mod genesis;
pub mod params;

pub use execution::{
    Account, AccountBandwidth, BlockHeader, Cid, Event, Key, Link, Message, Transaction,
    ValidatorUpdate, Value, NAMESPACE,
};
pub use genesis::{Genesis, GenesisError, HexBytes};
pub use params::{BandwidthParams, ModelParams, RankParams};
