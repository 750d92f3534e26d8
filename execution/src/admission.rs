//! Admission pipeline.
//!
//! Both entry points share the same preparation (decode, validate, identify
//! the payer, price the transaction, read its balance) and the same decision
//! function, [decide]. They differ only in what happens after admission:
//!
//! * [Pipeline::check] runs the signature and nonce check and optimistically
//!   debits the payer. The block governor is never touched.
//! * [Pipeline::deliver] executes the transaction in an isolated layer,
//!   charges the base cost even if execution fails, charges the linking cost
//!   of new edges on success, and accounts the total against the block.

use crate::{
    bandwidth::{BandwidthLedger, BandwidthModel, BlockGovernor, CostOracle, Regenerator},
    error::{AdmissionError, ExecutionError},
    layer::Executor,
    state::{load_account, Layer, State},
};
use anyhow::anyhow;
use commonware_codec::DecodeExt;
use commonware_cryptography::ed25519::PublicKey;
use commonware_utils::hex;
use linkchain_types::{
    execution::{AccountBandwidth, ValidationError},
    BandwidthParams, Event, Link, Transaction,
};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Mempool admission against the speculative check context.
    Check,
    /// In-block execution against the deliver context.
    Deliver,
}

/// Admission decision for a transaction costing `cost`.
///
/// Pure: depends only on its arguments. The block limit only applies when
/// delivering.
pub fn decide(
    mode: Mode,
    cost: u64,
    balance: &AccountBandwidth,
    governor: &BlockGovernor,
) -> Result<(), AdmissionError> {
    if !BandwidthLedger::has_enough(balance, cost) {
        return Err(AdmissionError::NotEnoughBandwidth {
            remaining: balance.remaining,
            cost,
        });
    }
    if mode == Mode::Deliver && !governor.fits(cost) {
        return Err(AdmissionError::ExceededMaxBlockBandwidth {
            spent: governor.spent_so_far(),
            cost,
            max: governor.max_allowed(),
        });
    }
    Ok(())
}

/// A transaction that passed admission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Admitted {
    pub payer: PublicKey,
    /// Total bandwidth charged (base plus linking cost).
    pub cost: u64,
    pub remaining: u64,
    pub events: Vec<Event>,
    pub new_links: Vec<Link>,
}

struct Prepared {
    tx: Transaction,
    payer: PublicKey,
    cost: u64,
    balance: AccountBandwidth,
}

/// Services used by admission, borrowed from the application for one call.
pub struct Pipeline<'a> {
    pub oracle: &'a dyn CostOracle,
    pub model: &'a dyn BandwidthModel,
    pub executor: &'a dyn Executor,
    pub params: &'a BandwidthParams,
}

impl Pipeline<'_> {
    fn prepare(
        &self,
        state: &dyn State,
        raw: &[u8],
        height: u64,
    ) -> Result<Prepared, AdmissionError> {
        let tx = Transaction::decode(raw)?;
        tx.validate_basic()?;
        let payer = tx
            .payer()
            .cloned()
            .ok_or(AdmissionError::Validation(ValidationError::NoSignatures))?;
        if load_account(state, &payer)?.is_none() {
            return Err(AdmissionError::UnknownAddress(hex(payer.as_ref())));
        }

        let cost = self.oracle.base_cost(&tx, self.params);
        let balance = BandwidthLedger::new(self.model).current_balance(state, &payer, height)?;

        Ok(Prepared {
            tx,
            payer,
            cost,
            balance,
        })
    }

    fn charge(
        state: &mut dyn State,
        payer: &PublicKey,
        balance: &mut AccountBandwidth,
        cost: u64,
        height: u64,
    ) -> Result<(), AdmissionError> {
        BandwidthLedger::debit(balance, cost, height).map_err(|err| anyhow!(err))?;
        BandwidthLedger::save(state, payer, *balance)?;
        Ok(())
    }

    pub fn check(
        &self,
        state: &mut dyn State,
        governor: &BlockGovernor,
        raw: &[u8],
        height: u64,
    ) -> Result<Admitted, AdmissionError> {
        let Prepared {
            tx,
            payer,
            cost,
            mut balance,
        } = self.prepare(state, raw, height)?;
        decide(Mode::Check, cost, &balance, governor)?;

        let changes = {
            let mut layer = Layer::new(&*state);
            self.executor.check(&mut layer, &tx)?;
            layer.commit()
        };
        state.apply(changes)?;
        Self::charge(state, &payer, &mut balance, cost, height)?;

        Ok(Admitted {
            payer,
            cost,
            remaining: balance.remaining,
            events: Vec::new(),
            new_links: Vec::new(),
        })
    }

    pub fn deliver(
        &self,
        state: &mut dyn State,
        governor: &mut BlockGovernor,
        regenerator: &mut Regenerator,
        raw: &[u8],
        height: u64,
    ) -> Result<Admitted, AdmissionError> {
        let Prepared {
            tx,
            payer,
            cost,
            mut balance,
        } = self.prepare(state, raw, height)?;
        decide(Mode::Deliver, cost, &balance, governor)?;

        // Execute in isolation; nothing below reaches `state` unless it succeeds.
        let executed = {
            let mut layer = Layer::new(&*state);
            match self.executor.deliver(&mut layer, &tx) {
                Ok(delivery) => {
                    let linking = self
                        .oracle
                        .linking_cost(delivery.new_links.len() as u64, self.params);
                    let total = cost.saturating_add(linking);
                    if !BandwidthLedger::has_enough(&balance, total) {
                        Err(ExecutionError::LinkingCostUnaffordable {
                            remaining: balance.remaining - cost,
                            cost: linking,
                        })
                    } else if !governor.fits(total) {
                        Err(ExecutionError::LinkingCostExceedsBlock {
                            spent: governor.spent_so_far().saturating_add(cost),
                            cost: linking,
                            max: governor.max_allowed(),
                        })
                    } else {
                        Ok((layer.commit(), delivery, linking))
                    }
                }
                Err(err) => Err(err),
            }
        };
        regenerator.touch(&payer);

        let (changes, delivery, linking) = match executed {
            Ok(executed) => executed,
            Err(err) => {
                Self::charge(state, &payer, &mut balance, cost, height)?;
                governor.add(cost).map_err(|err| anyhow!(err))?;
                warn!(
                    payer = ?payer,
                    cost,
                    remaining = balance.remaining,
                    %err,
                    "execution failed; base cost charged"
                );
                return Err(err.into());
            }
        };

        state.apply(changes)?;
        Self::charge(state, &payer, &mut balance, cost, height)?;
        if linking > 0 {
            Self::charge(state, &payer, &mut balance, linking, height)?;
        }
        let total = cost + linking;
        governor.add(total).map_err(|err| anyhow!(err))?;
        for account in &delivery.stake_changed {
            regenerator.touch(account);
        }
        debug!(
            payer = ?payer,
            cost,
            linking,
            new_links = delivery.new_links.len(),
            spent = governor.spent_so_far(),
            "transaction delivered"
        );

        let mut events = delivery.events;
        events.push(Event::BandwidthCharged {
            account: payer.clone(),
            amount: total,
            remaining: balance.remaining,
        });
        Ok(Admitted {
            payer,
            cost: total,
            remaining: balance.remaining,
            events,
            new_links: delivery.new_links,
        })
    }
}
