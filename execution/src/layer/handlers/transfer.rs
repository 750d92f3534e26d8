use super::super::*;

pub(in crate::layer) fn handle_send(
    state: &mut dyn State,
    from: &PublicKey,
    to: &PublicKey,
    amount: u64,
    delivery: &mut Delivery,
) -> Result<(), ExecutionError> {
    let mut sender = load_account(state, from)?
        .ok_or_else(|| ExecutionError::UnknownAccount(hex(from.as_ref())))?;
    if sender.balance < amount {
        return Err(ExecutionError::InsufficientFunds {
            balance: sender.balance,
            amount,
        });
    }
    sender.balance -= amount;
    state.insert(Key::Account(from.clone()), Value::Account(sender))?;

    let mut receiver = load_account(state, to)?.unwrap_or_default();
    receiver.balance = receiver
        .balance
        .checked_add(amount)
        .ok_or(ExecutionError::Overflow)?;
    state.insert(Key::Account(to.clone()), Value::Account(receiver))?;

    delivery.events.push(Event::Transfer {
        from: from.clone(),
        to: to.clone(),
        amount,
    });
    for account in [from, to] {
        if !delivery.stake_changed.contains(account) {
            delivery.stake_changed.push(account.clone());
        }
    }

    Ok(())
}
