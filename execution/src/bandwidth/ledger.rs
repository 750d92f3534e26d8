use super::BandwidthModel;
use crate::{
    error::LedgerError,
    state::{load_account, load_bandwidth, ReadState, State},
};
use anyhow::Result;
use commonware_cryptography::ed25519::PublicKey;
use linkchain_types::{execution::AccountBandwidth, Key, Value};

/// Per-account bandwidth balances.
///
/// The ledger never regenerates credit on its own; see [super::Regenerator].
pub struct BandwidthLedger<'m> {
    model: &'m dyn BandwidthModel,
}

impl<'m> BandwidthLedger<'m> {
    pub fn new(model: &'m dyn BandwidthModel) -> Self {
        Self { model }
    }

    /// Stored balance of `account`, or a full one sized from its stake if the
    /// account has never been charged.
    pub fn current_balance<S: ReadState + ?Sized>(
        &self,
        state: &S,
        account: &PublicKey,
        height: u64,
    ) -> Result<AccountBandwidth> {
        if let Some(bandwidth) = load_bandwidth(state, account)? {
            return Ok(bandwidth);
        }
        let stake = load_account(state, account)?
            .map(|account| account.balance)
            .unwrap_or_default();
        Ok(AccountBandwidth::full(self.model.capacity(stake), height))
    }

    pub fn has_enough(balance: &AccountBandwidth, cost: u64) -> bool {
        balance.remaining >= cost
    }

    /// Subtract `cost` from `balance`. Fails, leaving it untouched, if the
    /// caller skipped [BandwidthLedger::has_enough].
    pub fn debit(balance: &mut AccountBandwidth, cost: u64, height: u64) -> Result<(), LedgerError> {
        if !Self::has_enough(balance, cost) {
            return Err(LedgerError::Insufficient {
                remaining: balance.remaining,
                cost,
            });
        }
        // A full account starts regenerating from the block that first spends it
        if balance.remaining >= balance.capacity {
            balance.last_updated = height;
        }
        balance.remaining -= cost;
        Ok(())
    }

    pub fn save(state: &mut dyn State, account: &PublicKey, balance: AccountBandwidth) -> Result<()> {
        state.insert(Key::Bandwidth(account.clone()), Value::Bandwidth(balance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bandwidth::LinearModel,
        mocks::{create_account_keypair, fund, model_params},
        state::{load_bandwidth, Layer},
        store::Memory,
    };

    #[test]
    fn test_lazy_balance_from_stake() {
        let (_, alice) = create_account_keypair(1);
        let (_, nobody) = create_account_keypair(2);
        let mut base = Memory::default();
        fund(&mut base, &alice, 100);

        let model = LinearModel::new(model_params());
        let ledger = BandwidthLedger::new(&model);
        let balance = ledger.current_balance(&base, &alice, 4).unwrap();
        assert_eq!(balance, AccountBandwidth::full(100, 4));

        // Reading does not create the entry
        assert_eq!(load_bandwidth(&base, &alice).unwrap(), None);

        // Unknown accounts have no stake and therefore no capacity
        let balance = ledger.current_balance(&base, &nobody, 4).unwrap();
        assert_eq!(balance.capacity, 0);
    }

    #[test]
    fn test_debit_and_save() {
        let (_, alice) = create_account_keypair(1);
        let base = Memory::default();
        let mut layer = Layer::new(&base);

        let mut balance = AccountBandwidth::full(100, 0);
        assert!(BandwidthLedger::has_enough(&balance, 100));
        BandwidthLedger::debit(&mut balance, 40, 3).unwrap();
        assert_eq!(balance.remaining, 60);
        assert_eq!(balance.last_updated, 3);

        // Later debits keep the regeneration clock where it was
        BandwidthLedger::debit(&mut balance, 10, 5).unwrap();
        assert_eq!(balance.remaining, 50);
        assert_eq!(balance.last_updated, 3);
        balance.remaining = 60;

        // Overdrafts are refused and leave the balance untouched
        assert_eq!(
            BandwidthLedger::debit(&mut balance, 61, 4),
            Err(LedgerError::Insufficient {
                remaining: 60,
                cost: 61
            })
        );
        assert_eq!(balance.remaining, 60);

        BandwidthLedger::save(&mut layer, &alice, balance).unwrap();
        assert_eq!(load_bandwidth(&layer, &alice).unwrap(), Some(balance));
    }
}
