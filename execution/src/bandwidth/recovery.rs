use super::{BandwidthLedger, BandwidthModel};
use crate::state::{load_account, load_bandwidth, ReadState, State};
use anyhow::{bail, Result};
use commonware_cryptography::ed25519::PublicKey;
use linkchain_types::{execution::AccountBandwidth, Event, Key, Value};
use std::collections::BTreeSet;
use tracing::debug;

pub fn load_recovering<S: ReadState + ?Sized>(state: &S) -> Result<BTreeSet<PublicKey>> {
    match state.get(&Key::Recovering)? {
        Some(Value::Recovering(accounts)) => Ok(accounts.into_iter().collect()),
        None => Ok(BTreeSet::new()),
        Some(other) => bail!("recovering slot holds {other:?}"),
    }
}

/// End-of-block bandwidth regeneration.
///
/// Accounts charged or whose stake changed during the block are reported via
/// [Regenerator::touch]. At the end of the block their capacity is resized to
/// the current stake, and every account below capacity regains credit for the
/// blocks since it was last updated. The set of accounts below capacity is
/// kept in state so regeneration resumes after a restart.
#[derive(Debug, Default)]
pub struct Regenerator {
    touched: BTreeSet<PublicKey>,
}

impl Regenerator {
    pub fn touch(&mut self, account: &PublicKey) {
        self.touched.insert(account.clone());
    }

    pub fn touched(&self) -> usize {
        self.touched.len()
    }

    /// Forget accounts touched by a block that will not be committed.
    pub fn clear(&mut self) {
        self.touched.clear();
    }

    pub fn end_block(
        &mut self,
        state: &mut dyn State,
        model: &dyn BandwidthModel,
        height: u64,
    ) -> Result<Vec<Event>> {
        let before = load_recovering(state)?;
        let mut recovering = before.clone();

        for account in std::mem::take(&mut self.touched) {
            let stake = load_account(state, &account)?
                .map(|account| account.balance)
                .unwrap_or_default();
            let capacity = model.capacity(stake);
            let mut bandwidth = match load_bandwidth(state, &account)? {
                Some(bandwidth) => bandwidth,
                None => AccountBandwidth::full(capacity, height),
            };
            if bandwidth.capacity != capacity {
                debug!(
                    account = ?account,
                    from = bandwidth.capacity,
                    to = capacity,
                    "bandwidth capacity resized"
                );
                if bandwidth.remaining >= bandwidth.capacity {
                    bandwidth.last_updated = height;
                }
                bandwidth.capacity = capacity;
                bandwidth.remaining = bandwidth.remaining.min(capacity);
                BandwidthLedger::save(state, &account, bandwidth)?;
            }
            if bandwidth.remaining < bandwidth.capacity {
                recovering.insert(account);
            }
        }

        let mut events = Vec::new();
        let mut refilled = Vec::new();
        for account in &recovering {
            let Some(bandwidth) = load_bandwidth(state, account)? else {
                refilled.push(account.clone());
                continue;
            };
            let blocks = height.saturating_sub(bandwidth.last_updated);
            if blocks == 0 {
                continue;
            }
            let mut next = model.regenerate(bandwidth, blocks);
            next.last_updated = height;
            BandwidthLedger::save(state, account, next)?;
            events.push(Event::BandwidthRegenerated {
                account: account.clone(),
                remaining: next.remaining,
            });
            if next.remaining >= next.capacity {
                refilled.push(account.clone());
            }
        }
        for account in refilled {
            recovering.remove(&account);
        }

        if recovering != before {
            if recovering.is_empty() {
                state.delete(&Key::Recovering)?;
            } else {
                state.insert(
                    Key::Recovering,
                    Value::Recovering(recovering.into_iter().collect()),
                )?;
            }
        }

        Ok(events)
    }
}
