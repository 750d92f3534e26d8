//! Message execution.
//!
//! [Runtime] stands in for the economic modules: it runs the validity check
//! (signatures and nonce) and applies [Message]s against whatever [State] it
//! is handed. It is not atomic on its own; callers run it inside a
//! [crate::state::Layer] and drop that layer on failure.

use crate::{
    error::ExecutionError,
    state::{load_account, ReadState, State},
};
use commonware_cryptography::ed25519::PublicKey;
use commonware_utils::hex;
use linkchain_types::{execution::Account, Event, Key, Link, Message, Transaction, Value};
use tracing::debug;

mod handlers;

/// Outcome of a successful delivery.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    pub events: Vec<Event>,
    /// Edges that did not exist before this transaction, in creation order.
    pub new_links: Vec<Link>,
    /// Accounts whose stake (balance) changed.
    pub stake_changed: Vec<PublicKey>,
}

pub trait Executor: Send + Sync {
    /// Signature and nonce check. Increments the payer's nonce on success.
    fn check(&self, state: &mut dyn State, tx: &Transaction) -> Result<(), ExecutionError>;

    /// [Executor::check] followed by every message in order.
    fn deliver(&self, state: &mut dyn State, tx: &Transaction) -> Result<Delivery, ExecutionError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Runtime;

pub(crate) fn validate_and_increment_nonce(
    account: &mut Account,
    provided_nonce: u64,
) -> Result<(), ExecutionError> {
    if account.nonce != provided_nonce {
        return Err(ExecutionError::NonceMismatch {
            expected: account.nonce,
            got: provided_nonce,
        });
    }
    account.nonce = account.nonce.checked_add(1).ok_or(ExecutionError::Overflow)?;
    Ok(())
}

impl Runtime {
    fn prepare(&self, state: &mut dyn State, tx: &Transaction) -> Result<PublicKey, ExecutionError> {
        if !tx.verify() {
            return Err(ExecutionError::InvalidSignature);
        }
        let payer = tx
            .payer()
            .ok_or(ExecutionError::InvalidSignature)?
            .clone();
        let mut account = load_account(state, &payer)?
            .ok_or_else(|| ExecutionError::UnknownAccount(hex(payer.as_ref())))?;
        if let Err(err) = validate_and_increment_nonce(&mut account, tx.nonce) {
            debug!(public = ?payer, %err, "nonce check failed");
            return Err(err);
        }
        state.insert(Key::Account(payer.clone()), Value::Account(account))?;

        Ok(payer)
    }
}

impl Executor for Runtime {
    fn check(&self, state: &mut dyn State, tx: &Transaction) -> Result<(), ExecutionError> {
        self.prepare(state, tx).map(|_| ())
    }

    fn deliver(&self, state: &mut dyn State, tx: &Transaction) -> Result<Delivery, ExecutionError> {
        let payer = self.prepare(state, tx)?;
        let mut delivery = Delivery::default();
        for message in &tx.messages {
            match message {
                Message::Send { to, amount } => {
                    handlers::handle_send(state, &payer, to, *amount, &mut delivery)?
                }
                Message::Cyberlink { links } => {
                    handlers::handle_cyberlink(state, &payer, links, &mut delivery)?
                }
            }
        }

        Ok(delivery)
    }
}
