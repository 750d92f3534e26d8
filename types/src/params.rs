//! Durable chain parameter sets installed at genesis.

use bytes::{Buf, BufMut};
use commonware_codec::{Error, FixedSize, Read, ReadExt, Write};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Denominator of [BandwidthParams::credit_price].
pub const PRICE_DENOMINATOR: u64 = 1_000;

#[derive(Debug, Clone, ThisError, PartialEq, Eq)]
pub enum ParamsError {
    #[error("{field} must be > 0")]
    Zero { field: &'static str },
}

fn ensure_nonzero(field: &'static str, value: u64) -> Result<(), ParamsError> {
    if value == 0 {
        return Err(ParamsError::Zero { field });
    }
    Ok(())
}

/// Pricing of transactions in bandwidth units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandwidthParams {
    pub tx_cost: u64,
    pub link_msg_cost: u64,
    pub non_link_msg_cost: u64,
    /// Charged per encoded transaction byte.
    pub byte_cost: u64,
    /// Charged per newly created edge, after successful delivery.
    pub link_cost: u64,
    /// Permille multiplier applied to every priced amount.
    pub credit_price: u64,
    pub max_block_bandwidth: u64,
}

impl BandwidthParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        ensure_nonzero("credit_price", self.credit_price)?;
        ensure_nonzero("max_block_bandwidth", self.max_block_bandwidth)
    }
}

impl Write for BandwidthParams {
    fn write(&self, writer: &mut impl BufMut) {
        self.tx_cost.write(writer);
        self.link_msg_cost.write(writer);
        self.non_link_msg_cost.write(writer);
        self.byte_cost.write(writer);
        self.link_cost.write(writer);
        self.credit_price.write(writer);
        self.max_block_bandwidth.write(writer);
    }
}

impl Read for BandwidthParams {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            tx_cost: u64::read(reader)?,
            link_msg_cost: u64::read(reader)?,
            non_link_msg_cost: u64::read(reader)?,
            byte_cost: u64::read(reader)?,
            link_cost: u64::read(reader)?,
            credit_price: u64::read(reader)?,
            max_block_bandwidth: u64::read(reader)?,
        })
    }
}

impl FixedSize for BandwidthParams {
    const SIZE: usize = 7 * u64::SIZE;
}

/// Versioned stake-to-capacity mapping and regeneration rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelParams {
    pub version: u16,
    pub capacity_numerator: u64,
    pub capacity_denominator: u64,
    /// Blocks needed to regenerate an empty account to full capacity.
    pub recovery_period: u64,
}

impl ModelParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        ensure_nonzero("capacity_denominator", self.capacity_denominator)?;
        ensure_nonzero("recovery_period", self.recovery_period)
    }
}

impl Write for ModelParams {
    fn write(&self, writer: &mut impl BufMut) {
        self.version.write(writer);
        self.capacity_numerator.write(writer);
        self.capacity_denominator.write(writer);
        self.recovery_period.write(writer);
    }
}

impl Read for ModelParams {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            version: u16::read(reader)?,
            capacity_numerator: u64::read(reader)?,
            capacity_denominator: u64::read(reader)?,
            recovery_period: u64::read(reader)?,
        })
    }
}

impl FixedSize for ModelParams {
    const SIZE: usize = u16::SIZE + 3 * u64::SIZE;
}

/// Round-boundary parameter set of the rank subsystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankParams {
    pub calculation_period: u64,
}

impl RankParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        ensure_nonzero("calculation_period", self.calculation_period)
    }
}

impl Write for RankParams {
    fn write(&self, writer: &mut impl BufMut) {
        self.calculation_period.write(writer);
    }
}

impl Read for RankParams {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            calculation_period: u64::read(reader)?,
        })
    }
}

impl FixedSize for RankParams {
    const SIZE: usize = u64::SIZE;
}
