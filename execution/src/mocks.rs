use crate::state::State;
use commonware_cryptography::{
    ed25519::{PrivateKey, PublicKey},
    Signer,
};
use linkchain_types::{
    execution::Account,
    genesis::{GenesisAccount, GenesisDoc, GenesisValidator},
    BandwidthParams, Cid, HexBytes, Key, Link, Message, ModelParams, RankParams, Transaction,
    Value,
};
use rand::{rngs::StdRng, SeedableRng};

/// `Random` (a `Signer` supertrait) is reachable through the bound without importing it.
fn random_signer<S: Signer>(rng: &mut StdRng) -> S {
    S::random(rng)
}

/// Creates an account keypair for Ed25519 signatures used by users
pub fn create_account_keypair(seed: u64) -> (PrivateKey, PublicKey) {
    let mut rng = StdRng::seed_from_u64(seed);
    let private = random_signer::<PrivateKey>(&mut rng);
    let public = private.public_key();
    (private, public)
}

/// Content identifier built from a short label.
pub fn cid(label: &str) -> Cid {
    Cid::new(label.as_bytes()).unwrap()
}

/// Installs `account` with a zero nonce and `balance` of stake.
pub fn fund(state: &mut impl State, account: &PublicKey, balance: u64) {
    state
        .insert(
            Key::Account(account.clone()),
            Value::Account(Account { nonce: 0, balance }),
        )
        .unwrap();
}

/// One unit per transaction, per message and per new edge; bytes are free.
pub fn bandwidth_params() -> BandwidthParams {
    BandwidthParams {
        tx_cost: 1,
        link_msg_cost: 1,
        non_link_msg_cost: 1,
        byte_cost: 0,
        link_cost: 1,
        credit_price: 1_000,
        max_block_bandwidth: 1_000,
    }
}

/// Capacity equals stake; an empty account refills in 10 blocks.
pub fn model_params() -> ModelParams {
    ModelParams {
        version: 1,
        capacity_numerator: 1,
        capacity_denominator: 1,
        recovery_period: 10,
    }
}

pub fn rank_params() -> RankParams {
    RankParams {
        calculation_period: 5,
    }
}

/// Signed transaction carrying a single cyberlink message.
pub fn link_tx(private: &PrivateKey, nonce: u64, links: &[(&str, &str)]) -> Transaction {
    let links = links
        .iter()
        .map(|(from, to)| Link::new(cid(from), cid(to)))
        .collect();
    Transaction::sign(private, nonce, vec![Message::Cyberlink { links }], Vec::new())
}

/// Signed transaction carrying a single transfer.
pub fn send_tx(private: &PrivateKey, nonce: u64, to: &PublicKey, amount: u64) -> Transaction {
    Transaction::sign(
        private,
        nonce,
        vec![Message::Send {
            to: to.clone(),
            amount,
        }],
        Vec::new(),
    )
}

/// Genesis document with the given funded accounts and validators (power 10)
/// using the mock parameter sets.
pub fn genesis_doc(accounts: &[(PublicKey, u64)], validators: &[PublicKey]) -> GenesisDoc {
    GenesisDoc {
        chain_id: "linkchain-test".to_string(),
        accounts: accounts
            .iter()
            .map(|(address, balance)| GenesisAccount {
                address: HexBytes::from(address.as_ref()),
                balance: *balance,
            })
            .collect(),
        validators: validators
            .iter()
            .map(|public_key| GenesisValidator {
                public_key: HexBytes::from(public_key.as_ref()),
                power: 10,
            })
            .collect(),
        bandwidth: bandwidth_params(),
        model: model_params(),
        rank: rank_params(),
    }
}

pub fn genesis_json(doc: &GenesisDoc) -> Vec<u8> {
    serde_json::to_vec(doc).unwrap()
}
