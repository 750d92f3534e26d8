//! Genesis document parsing.

use crate::{
    execution::ValidatorUpdate,
    params::{BandwidthParams, ModelParams, ParamsError, RankParams},
};
use commonware_codec::DecodeExt;
use commonware_cryptography::ed25519::PublicKey;
use commonware_utils::{from_hex_formatted, hex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error as ThisError;

/// Hex-encoded bytes in JSON and YAML documents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HexBytes(Vec<u8>);

impl HexBytes {
    pub fn from_hex_formatted(value: &str) -> Option<Self> {
        from_hex_formatted(value).map(Self)
    }
}

impl From<&[u8]> for HexBytes {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl AsRef<[u8]> for HexBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for HexBytes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex(self.as_ref()))
    }
}

impl<'de> Deserialize<'de> for HexBytes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        let bytes = from_hex_formatted(&value)
            .ok_or_else(|| serde::de::Error::custom("expected a hex string"))?;
        Ok(Self(bytes))
    }
}

#[derive(Debug, ThisError)]
pub enum GenesisError {
    #[error("invalid genesis json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{field} is not an ed25519 public key: {value}")]
    InvalidKey { field: &'static str, value: String },
    #[error("duplicate genesis account {0}")]
    DuplicateAccount(String),
    #[error("duplicate genesis validator {0}")]
    DuplicateValidator(String),
    #[error("validator {0} has zero power")]
    ZeroPower(String),
    #[error("genesis has no validators")]
    NoValidators,
    #[error("invalid parameters: {0}")]
    Params(#[from] ParamsError),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: HexBytes,
    pub balance: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisValidator {
    pub public_key: HexBytes,
    pub power: u64,
}

/// Genesis document as written on disk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisDoc {
    pub chain_id: String,
    #[serde(default)]
    pub accounts: Vec<GenesisAccount>,
    pub validators: Vec<GenesisValidator>,
    pub bandwidth: BandwidthParams,
    pub model: ModelParams,
    pub rank: RankParams,
}

/// Genesis state with decoded keys and checked parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Genesis {
    pub chain_id: String,
    pub accounts: Vec<(PublicKey, u64)>,
    /// Sorted by public key.
    pub validators: Vec<ValidatorUpdate>,
    pub bandwidth: BandwidthParams,
    pub model: ModelParams,
    pub rank: RankParams,
}

fn decode_key(field: &'static str, value: &HexBytes) -> Result<PublicKey, GenesisError> {
    PublicKey::decode(value.as_ref()).map_err(|_| GenesisError::InvalidKey {
        field,
        value: hex(value.as_ref()),
    })
}

impl Genesis {
    pub fn parse(bytes: &[u8]) -> Result<Self, GenesisError> {
        let doc: GenesisDoc = serde_json::from_slice(bytes)?;
        Self::try_from(doc)
    }
}

impl TryFrom<GenesisDoc> for Genesis {
    type Error = GenesisError;

    fn try_from(doc: GenesisDoc) -> Result<Self, Self::Error> {
        doc.bandwidth.validate()?;
        doc.model.validate()?;
        doc.rank.validate()?;

        let mut seen = BTreeSet::new();
        let mut accounts = Vec::with_capacity(doc.accounts.len());
        for account in &doc.accounts {
            let address = decode_key("accounts.address", &account.address)?;
            if !seen.insert(address.clone()) {
                return Err(GenesisError::DuplicateAccount(hex(address.as_ref())));
            }
            accounts.push((address, account.balance));
        }

        if doc.validators.is_empty() {
            return Err(GenesisError::NoValidators);
        }
        let mut validators = Vec::with_capacity(doc.validators.len());
        for validator in &doc.validators {
            let public_key = decode_key("validators.public_key", &validator.public_key)?;
            if validator.power == 0 {
                return Err(GenesisError::ZeroPower(hex(public_key.as_ref())));
            }
            validators.push(ValidatorUpdate {
                public_key,
                power: validator.power,
            });
        }
        validators.sort();
        for pair in validators.windows(2) {
            if pair[0].public_key == pair[1].public_key {
                return Err(GenesisError::DuplicateValidator(hex(
                    pair[0].public_key.as_ref()
                )));
            }
        }

        Ok(Self {
            chain_id: doc.chain_id,
            accounts,
            validators,
            bandwidth: doc.bandwidth,
            model: doc.model,
            rank: doc.rank,
        })
    }
}
