use crate::params::{BandwidthParams, ModelParams, RankParams};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, ReadRangeExt, Write};
use commonware_cryptography::{
    ed25519::{self, PublicKey},
    Signer, Verifier,
};
use commonware_utils::{hex, union};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};
use thiserror::Error as ThisError;

pub const NAMESPACE: &[u8] = b"_LINKCHAIN";
pub const TRANSACTION_SUFFIX: &[u8] = b"_TX";

pub const MAX_CID_LENGTH: usize = 64;
pub const MAX_LINKS_PER_MESSAGE: usize = 64;
pub const MAX_TRANSACTION_MESSAGES: usize = 16;
pub const MAX_TRANSACTION_SIGNERS: usize = 4;
pub const MAX_MEMO_LENGTH: usize = 256;
pub const MAX_VALIDATORS: usize = 1024;
pub const MAX_RECOVERING_ACCOUNTS: usize = 1 << 20;

#[inline]
pub fn transaction_namespace(namespace: &[u8]) -> Vec<u8> {
    union(namespace, TRANSACTION_SUFFIX)
}

/// Content identifier of a node in the knowledge graph.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Cid(Vec<u8>);

#[derive(Debug, ThisError, PartialEq, Eq)]
#[error("cid length {0} outside 1..={MAX_CID_LENGTH}")]
pub struct CidLengthError(pub usize);

impl Cid {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, CidLengthError> {
        let bytes = bytes.into();
        if bytes.is_empty() || bytes.len() > MAX_CID_LENGTH {
            return Err(CidLengthError(bytes.len()));
        }
        Ok(Self(bytes))
    }
}

impl AsRef<[u8]> for Cid {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex(&self.0))
    }
}

impl Write for Cid {
    fn write(&self, writer: &mut impl BufMut) {
        self.0.write(writer);
    }
}

impl Read for Cid {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self(Vec::<u8>::read_range(reader, 1..=MAX_CID_LENGTH)?))
    }
}

impl EncodeSize for Cid {
    fn encode_size(&self) -> usize {
        self.0.encode_size()
    }
}

/// Directed edge between two content identifiers.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Link {
    pub from: Cid,
    pub to: Cid,
}

impl Link {
    pub fn new(from: Cid, to: Cid) -> Self {
        Self { from, to }
    }
}

impl Write for Link {
    fn write(&self, writer: &mut impl BufMut) {
        self.from.write(writer);
        self.to.write(writer);
    }
}

impl Read for Link {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            from: Cid::read(reader)?,
            to: Cid::read(reader)?,
        })
    }
}

impl EncodeSize for Link {
    fn encode_size(&self) -> usize {
        self.from.encode_size() + self.to.encode_size()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// Move `amount` from the payer to `to`.
    /// Binary: [0] [to:PublicKey] [amount:u64 BE]
    Send { to: PublicKey, amount: u64 },

    /// Create directed edges on behalf of the payer.
    /// Binary: [1] [len:varint] [Link...]
    Cyberlink { links: Vec<Link> },
}

impl Message {
    /// Whether the message creates graph edges (priced as a linking operation).
    pub fn is_linking(&self) -> bool {
        matches!(self, Self::Cyberlink { .. })
    }
}

impl Write for Message {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Send { to, amount } => {
                0u8.write(writer);
                to.write(writer);
                amount.write(writer);
            }
            Self::Cyberlink { links } => {
                1u8.write(writer);
                links.write(writer);
            }
        }
    }
}

impl Read for Message {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let message = match u8::read(reader)? {
            0 => Self::Send {
                to: PublicKey::read(reader)?,
                amount: u64::read(reader)?,
            },
            // Empty link lists decode; validation rejects them.
            1 => Self::Cyberlink {
                links: Vec::<Link>::read_range(reader, 0..=MAX_LINKS_PER_MESSAGE)?,
            },
            i => return Err(Error::InvalidEnum(i)),
        };

        Ok(message)
    }
}

impl EncodeSize for Message {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::Send { to, amount } => to.encode_size() + amount.encode_size(),
                Self::Cyberlink { links } => links.encode_size(),
            }
    }
}

/// Structural defects found by [Transaction::validate_basic].
#[derive(Debug, Clone, ThisError, PartialEq, Eq)]
pub enum ValidationError {
    #[error("transaction has no messages")]
    NoMessages,
    #[error("transaction has no signatures")]
    NoSignatures,
    #[error("duplicate signer {0}")]
    DuplicateSigner(String),
    #[error("message {index}: send amount must be > 0")]
    ZeroAmount { index: usize },
    #[error("message {index}: send to self")]
    SelfTransfer { index: usize },
    #[error("message {index}: cyberlink has no links")]
    EmptyCyberlink { index: usize },
    #[error("message {index}: link from {cid} to itself")]
    SelfLink { index: usize, cid: String },
    #[error("message {index}: duplicate link {from} -> {to}")]
    DuplicateLink {
        index: usize,
        from: String,
        to: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub nonce: u64,
    pub messages: Vec<Message>,
    pub memo: Vec<u8>,

    /// Signers in signing order. The first signer pays.
    pub signatures: Vec<(PublicKey, ed25519::Signature)>,
}

impl Transaction {
    #[allow(clippy::ptr_arg)]
    fn payload(nonce: &u64, messages: &Vec<Message>, memo: &Vec<u8>) -> Vec<u8> {
        let mut payload = Vec::new();
        nonce.write(&mut payload);
        messages.write(&mut payload);
        memo.write(&mut payload);

        payload
    }

    pub fn sign(
        private: &ed25519::PrivateKey,
        nonce: u64,
        messages: Vec<Message>,
        memo: Vec<u8>,
    ) -> Self {
        let mut tx = Self {
            nonce,
            messages,
            memo,
            signatures: Vec::new(),
        };
        tx.cosign(private);
        tx
    }

    /// Append another signature over the same payload.
    pub fn cosign(&mut self, private: &ed25519::PrivateKey) {
        let signature = private.sign(
            &transaction_namespace(NAMESPACE),
            &Self::payload(&self.nonce, &self.messages, &self.memo),
        );
        self.signatures.push((private.public_key(), signature));
    }

    pub fn verify(&self) -> bool {
        if self.signatures.is_empty() {
            return false;
        }
        let namespace = transaction_namespace(NAMESPACE);
        let payload = Self::payload(&self.nonce, &self.messages, &self.memo);
        self.signatures
            .iter()
            .all(|(public, signature)| public.verify(&namespace, &payload, signature))
    }

    /// The account charged for the transaction.
    pub fn payer(&self) -> Option<&PublicKey> {
        self.signatures.first().map(|(public, _)| public)
    }

    pub fn signers(&self) -> impl Iterator<Item = &PublicKey> {
        self.signatures.iter().map(|(public, _)| public)
    }

    /// Stateless checks run before any account or bandwidth lookup.
    pub fn validate_basic(&self) -> Result<(), ValidationError> {
        if self.messages.is_empty() {
            return Err(ValidationError::NoMessages);
        }
        let Some(payer) = self.payer() else {
            return Err(ValidationError::NoSignatures);
        };

        let mut seen = BTreeSet::new();
        for signer in self.signers() {
            if !seen.insert(signer) {
                return Err(ValidationError::DuplicateSigner(hex(signer.as_ref())));
            }
        }

        for (index, message) in self.messages.iter().enumerate() {
            match message {
                Message::Send { to, amount } => {
                    if *amount == 0 {
                        return Err(ValidationError::ZeroAmount { index });
                    }
                    if to == payer {
                        return Err(ValidationError::SelfTransfer { index });
                    }
                }
                Message::Cyberlink { links } => {
                    if links.is_empty() {
                        return Err(ValidationError::EmptyCyberlink { index });
                    }
                    let mut unique = BTreeSet::new();
                    for link in links {
                        if link.from == link.to {
                            return Err(ValidationError::SelfLink {
                                index,
                                cid: link.from.to_string(),
                            });
                        }
                        if !unique.insert(link) {
                            return Err(ValidationError::DuplicateLink {
                                index,
                                from: link.from.to_string(),
                                to: link.to.to_string(),
                            });
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

impl Write for Transaction {
    fn write(&self, writer: &mut impl BufMut) {
        self.nonce.write(writer);
        self.messages.write(writer);
        self.memo.write(writer);
        self.signatures.write(writer);
    }
}

impl Read for Transaction {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let nonce = u64::read(reader)?;
        let messages = Vec::<Message>::read_range(reader, 0..=MAX_TRANSACTION_MESSAGES)?;
        let memo = Vec::<u8>::read_range(reader, 0..=MAX_MEMO_LENGTH)?;
        let signatures = Vec::<(PublicKey, ed25519::Signature)>::read_range(
            reader,
            0..=MAX_TRANSACTION_SIGNERS,
        )?;

        Ok(Self {
            nonce,
            messages,
            memo,
            signatures,
        })
    }
}

impl EncodeSize for Transaction {
    fn encode_size(&self) -> usize {
        self.nonce.encode_size()
            + self.messages.encode_size()
            + self.memo.encode_size()
            + self.signatures.encode_size()
    }
}

/// Token account tracked by the economic module. The balance doubles as stake.
#[derive(Clone, Default, Eq, PartialEq, Debug)]
pub struct Account {
    pub nonce: u64,
    pub balance: u64,
}

impl Write for Account {
    fn write(&self, writer: &mut impl BufMut) {
        self.nonce.write(writer);
        self.balance.write(writer);
    }
}

impl Read for Account {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            nonce: u64::read(reader)?,
            balance: u64::read(reader)?,
        })
    }
}

impl EncodeSize for Account {
    fn encode_size(&self) -> usize {
        self.nonce.encode_size() + self.balance.encode_size()
    }
}

/// Per-account bandwidth credit.
#[derive(Clone, Copy, Default, Eq, PartialEq, Debug)]
pub struct AccountBandwidth {
    pub remaining: u64,
    pub capacity: u64,
    /// Height of the last debit or regeneration.
    pub last_updated: u64,
}

impl AccountBandwidth {
    pub fn full(capacity: u64, height: u64) -> Self {
        Self {
            remaining: capacity,
            capacity,
            last_updated: height,
        }
    }
}

impl Write for AccountBandwidth {
    fn write(&self, writer: &mut impl BufMut) {
        self.remaining.write(writer);
        self.capacity.write(writer);
        self.last_updated.write(writer);
    }
}

impl Read for AccountBandwidth {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            remaining: u64::read(reader)?,
            capacity: u64::read(reader)?,
            last_updated: u64::read(reader)?,
        })
    }
}

impl FixedSize for AccountBandwidth {
    const SIZE: usize = 3 * u64::SIZE;
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ValidatorUpdate {
    pub public_key: PublicKey,
    pub power: u64,
}

impl Write for ValidatorUpdate {
    fn write(&self, writer: &mut impl BufMut) {
        self.public_key.write(writer);
        self.power.write(writer);
    }
}

impl Read for ValidatorUpdate {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            public_key: PublicKey::read(reader)?,
            power: u64::read(reader)?,
        })
    }
}

impl FixedSize for ValidatorUpdate {
    const SIZE: usize = PublicKey::SIZE + u64::SIZE;
}

/// Header handed to the application at the start of every block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: u64,
    #[serde(default)]
    pub time_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Transfer {
        from: PublicKey,
        to: PublicKey,
        amount: u64,
    },
    Linked {
        signer: PublicKey,
        link: Link,
    },
    BandwidthCharged {
        account: PublicKey,
        amount: u64,
        remaining: u64,
    },
    BandwidthRegenerated {
        account: PublicKey,
        remaining: u64,
    },
    RankCalculated {
        height: u64,
        cids: u64,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transfer { .. } => "transfer",
            Self::Linked { .. } => "cyberlink",
            Self::BandwidthCharged { .. } => "bandwidth_charged",
            Self::BandwidthRegenerated { .. } => "bandwidth_regenerated",
            Self::RankCalculated { .. } => "rank_calculated",
        }
    }
}

#[derive(Hash, Eq, PartialEq, Ord, PartialOrd, Clone, Debug)]
pub enum Key {
    /// Token account (tag 0)
    Account(PublicKey),
    /// Bandwidth credit (tag 1)
    Bandwidth(PublicKey),
    /// Accounts below capacity (tag 2)
    Recovering,

    // Link index (tags 3-5)
    Edge(Link),
    LinkAt(u64),
    LinkCount,

    // Parameter sets (tags 6-9)
    BandwidthParams,
    ModelParams,
    RankParams,
    Validators,
}

impl Write for Key {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Account(pk) => {
                0u8.write(writer);
                pk.write(writer);
            }
            Self::Bandwidth(pk) => {
                1u8.write(writer);
                pk.write(writer);
            }
            Self::Recovering => 2u8.write(writer),

            Self::Edge(link) => {
                3u8.write(writer);
                link.write(writer);
            }
            Self::LinkAt(index) => {
                4u8.write(writer);
                index.write(writer);
            }
            Self::LinkCount => 5u8.write(writer),

            Self::BandwidthParams => 6u8.write(writer),
            Self::ModelParams => 7u8.write(writer),
            Self::RankParams => 8u8.write(writer),
            Self::Validators => 9u8.write(writer),
        }
    }
}

impl Read for Key {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let key = match u8::read(reader)? {
            0 => Self::Account(PublicKey::read(reader)?),
            1 => Self::Bandwidth(PublicKey::read(reader)?),
            2 => Self::Recovering,

            3 => Self::Edge(Link::read(reader)?),
            4 => Self::LinkAt(u64::read(reader)?),
            5 => Self::LinkCount,

            6 => Self::BandwidthParams,
            7 => Self::ModelParams,
            8 => Self::RankParams,
            9 => Self::Validators,

            i => return Err(Error::InvalidEnum(i)),
        };

        Ok(key)
    }
}

impl EncodeSize for Key {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::Account(_) | Self::Bandwidth(_) => PublicKey::SIZE,
                Self::Recovering => 0,
                Self::Edge(link) => link.encode_size(),
                Self::LinkAt(_) => u64::SIZE,
                Self::LinkCount
                | Self::BandwidthParams
                | Self::ModelParams
                | Self::RankParams
                | Self::Validators => 0,
            }
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Value {
    Account(Account),
    Bandwidth(AccountBandwidth),
    Recovering(Vec<PublicKey>),

    /// Position of the edge in commit order.
    Edge(u64),
    LinkAt(Link),
    LinkCount(u64),

    BandwidthParams(BandwidthParams),
    ModelParams(ModelParams),
    RankParams(RankParams),
    Validators(Vec<ValidatorUpdate>),
}

impl Write for Value {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Account(account) => {
                0u8.write(writer);
                account.write(writer);
            }
            Self::Bandwidth(bandwidth) => {
                1u8.write(writer);
                bandwidth.write(writer);
            }
            Self::Recovering(accounts) => {
                2u8.write(writer);
                accounts.write(writer);
            }

            Self::Edge(index) => {
                3u8.write(writer);
                index.write(writer);
            }
            Self::LinkAt(link) => {
                4u8.write(writer);
                link.write(writer);
            }
            Self::LinkCount(count) => {
                5u8.write(writer);
                count.write(writer);
            }

            Self::BandwidthParams(params) => {
                6u8.write(writer);
                params.write(writer);
            }
            Self::ModelParams(params) => {
                7u8.write(writer);
                params.write(writer);
            }
            Self::RankParams(params) => {
                8u8.write(writer);
                params.write(writer);
            }
            Self::Validators(validators) => {
                9u8.write(writer);
                validators.write(writer);
            }
        }
    }
}

impl Read for Value {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = match u8::read(reader)? {
            0 => Self::Account(Account::read(reader)?),
            1 => Self::Bandwidth(AccountBandwidth::read(reader)?),
            2 => Self::Recovering(Vec::<PublicKey>::read_range(
                reader,
                0..=MAX_RECOVERING_ACCOUNTS,
            )?),

            3 => Self::Edge(u64::read(reader)?),
            4 => Self::LinkAt(Link::read(reader)?),
            5 => Self::LinkCount(u64::read(reader)?),

            6 => Self::BandwidthParams(BandwidthParams::read(reader)?),
            7 => Self::ModelParams(ModelParams::read(reader)?),
            8 => Self::RankParams(RankParams::read(reader)?),
            9 => Self::Validators(Vec::<ValidatorUpdate>::read_range(
                reader,
                0..=MAX_VALIDATORS,
            )?),

            i => return Err(Error::InvalidEnum(i)),
        };

        Ok(value)
    }
}

impl EncodeSize for Value {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::Account(account) => account.encode_size(),
                Self::Bandwidth(bandwidth) => bandwidth.encode_size(),
                Self::Recovering(accounts) => accounts.encode_size(),
                Self::Edge(index) => index.encode_size(),
                Self::LinkAt(link) => link.encode_size(),
                Self::LinkCount(count) => count.encode_size(),
                Self::BandwidthParams(params) => params.encode_size(),
                Self::ModelParams(params) => params.encode_size(),
                Self::RankParams(params) => params.encode_size(),
                Self::Validators(validators) => validators.encode_size(),
            }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_codec::{DecodeExt, Encode};
    #[allow(unused_imports)]
    use commonware_cryptography::Signer;

    fn cid(s: &str) -> Cid {
        Cid::new(s.as_bytes().to_vec()).unwrap()
    }

    fn signer(seed: u64) -> ed25519::PrivateKey {
        ed25519::PrivateKey::from_seed(seed)
    }

    #[test]
    fn test_cid_length_bounds() {
        assert_eq!(Cid::new(Vec::new()), Err(CidLengthError(0)));
        assert!(Cid::new(vec![7u8; MAX_CID_LENGTH]).is_ok());
        assert_eq!(
            Cid::new(vec![7u8; MAX_CID_LENGTH + 1]),
            Err(CidLengthError(MAX_CID_LENGTH + 1))
        );
    }

    #[test]
    fn test_transaction_codec_and_signatures() {
        let alice = signer(1);
        let bob = signer(2);
        let mut tx = Transaction::sign(
            &alice,
            3,
            vec![Message::Cyberlink {
                links: vec![Link::new(cid("a"), cid("b"))],
            }],
            b"memo".to_vec(),
        );
        tx.cosign(&bob);
        assert!(tx.verify());
        assert_eq!(tx.payer(), Some(&alice.public_key()));

        let decoded = Transaction::decode(tx.encode()).unwrap();
        assert_eq!(decoded, tx);
        assert!(decoded.verify());

        // Tampering with the payload invalidates every signature
        let mut tampered = decoded;
        tampered.nonce += 1;
        assert!(!tampered.verify());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let tx = Transaction::sign(
            &signer(1),
            0,
            vec![Message::Send {
                to: signer(2).public_key(),
                amount: 5,
            }],
            Vec::new(),
        );
        let mut bytes = tx.encode().to_vec();
        bytes.push(0);
        assert!(Transaction::decode(bytes.as_slice()).is_err());
    }

    #[test]
    fn test_unknown_message_tag_rejected() {
        // nonce, then a single message carrying an unknown tag
        let mut bytes = Vec::new();
        0u64.write(&mut bytes);
        1u8.write(&mut bytes);
        9u8.write(&mut bytes);
        assert!(matches!(
            Transaction::decode(bytes.as_slice()),
            Err(Error::InvalidEnum(9))
        ));
    }

    #[test]
    fn test_validate_basic() {
        let alice = signer(1);
        let bob = signer(2);

        let empty = Transaction::sign(&alice, 0, vec![], Vec::new());
        assert_eq!(empty.validate_basic(), Err(ValidationError::NoMessages));

        let unsigned = Transaction {
            nonce: 0,
            messages: vec![Message::Send {
                to: bob.public_key(),
                amount: 1,
            }],
            memo: Vec::new(),
            signatures: Vec::new(),
        };
        assert_eq!(unsigned.validate_basic(), Err(ValidationError::NoSignatures));

        let zero = Transaction::sign(
            &alice,
            0,
            vec![Message::Send {
                to: bob.public_key(),
                amount: 0,
            }],
            Vec::new(),
        );
        assert_eq!(
            zero.validate_basic(),
            Err(ValidationError::ZeroAmount { index: 0 })
        );

        let to_self = Transaction::sign(
            &alice,
            0,
            vec![Message::Send {
                to: alice.public_key(),
                amount: 1,
            }],
            Vec::new(),
        );
        assert_eq!(
            to_self.validate_basic(),
            Err(ValidationError::SelfTransfer { index: 0 })
        );

        let no_links = Transaction::sign(
            &alice,
            0,
            vec![Message::Cyberlink { links: vec![] }],
            Vec::new(),
        );
        assert_eq!(
            no_links.validate_basic(),
            Err(ValidationError::EmptyCyberlink { index: 0 })
        );

        let loop_link = Transaction::sign(
            &alice,
            0,
            vec![Message::Cyberlink {
                links: vec![Link::new(cid("a"), cid("a"))],
            }],
            Vec::new(),
        );
        assert!(matches!(
            loop_link.validate_basic(),
            Err(ValidationError::SelfLink { index: 0, .. })
        ));

        let duplicate = Transaction::sign(
            &alice,
            0,
            vec![Message::Cyberlink {
                links: vec![Link::new(cid("a"), cid("b")), Link::new(cid("a"), cid("b"))],
            }],
            Vec::new(),
        );
        assert!(matches!(
            duplicate.validate_basic(),
            Err(ValidationError::DuplicateLink { index: 0, .. })
        ));

        let mut twice = Transaction::sign(
            &alice,
            0,
            vec![Message::Send {
                to: bob.public_key(),
                amount: 1,
            }],
            Vec::new(),
        );
        twice.cosign(&alice);
        assert!(matches!(
            twice.validate_basic(),
            Err(ValidationError::DuplicateSigner(_))
        ));
    }

    #[test]
    fn test_key_value_codec() {
        let key = Key::Edge(Link::new(cid("from"), cid("to")));
        assert_eq!(Key::decode(key.encode()).unwrap(), key);

        let value = Value::Bandwidth(AccountBandwidth {
            remaining: 10,
            capacity: 20,
            last_updated: 3,
        });
        assert_eq!(value.encode().len(), value.encode_size());
        assert_eq!(Value::decode(value.encode()).unwrap(), value);

        let validators = Value::Validators(vec![ValidatorUpdate {
            public_key: signer(9).public_key(),
            power: 10,
        }]);
        assert_eq!(Value::decode(validators.encode()).unwrap(), validators);
    }
}
