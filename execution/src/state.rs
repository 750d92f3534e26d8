use anyhow::{bail, Result};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, Write};
use commonware_cryptography::ed25519::PublicKey;
use linkchain_types::{
    execution::{Account, AccountBandwidth},
    BandwidthParams, Key, ModelParams, RankParams, Value,
};
use std::collections::BTreeMap;

/// Read access to keyed application state.
pub trait ReadState {
    fn get(&self, key: &Key) -> Result<Option<Value>>;
}

pub trait State: ReadState {
    fn insert(&mut self, key: Key, value: Value) -> Result<()>;
    fn delete(&mut self, key: &Key) -> Result<()>;

    fn apply(&mut self, changes: Vec<(Key, Status)>) -> Result<()> {
        for (key, status) in changes {
            match status {
                Status::Update(value) => self.insert(key, value)?,
                Status::Delete => self.delete(&key)?,
            }
        }
        Ok(())
    }
}

impl<T: ReadState + ?Sized> ReadState for &T {
    fn get(&self, key: &Key) -> Result<Option<Value>> {
        (**self).get(key)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Update(Value),
    Delete,
}

impl Write for Status {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Status::Update(value) => {
                0u8.write(writer);
                value.write(writer);
            }
            Status::Delete => 1u8.write(writer),
        }
    }
}

impl Read for Status {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let kind = u8::read(reader)?;
        match kind {
            0 => Ok(Status::Update(Value::read(reader)?)),
            1 => Ok(Status::Delete),
            _ => Err(Error::InvalidEnum(kind)),
        }
    }
}

impl EncodeSize for Status {
    fn encode_size(&self) -> usize {
        1 + match self {
            Status::Update(value) => value.encode_size(),
            Status::Delete => 0,
        }
    }
}

/// Pending changes over a read-only base.
///
/// Layers nest: a transaction executes in a layer over the block layer, and
/// its changes are only merged back (via [Layer::commit] and [State::apply])
/// once it succeeds. Dropping a layer discards everything it recorded.
pub struct Layer<'a, S: ReadState + ?Sized> {
    state: &'a S,
    pending: BTreeMap<Key, Status>,
}

impl<'a, S: ReadState + ?Sized> Layer<'a, S> {
    pub fn new(state: &'a S) -> Self {
        Self::with_pending(state, BTreeMap::new())
    }

    /// Resume a layer whose changes were parked with [Layer::into_pending].
    pub fn with_pending(state: &'a S, pending: BTreeMap<Key, Status>) -> Self {
        Self { state, pending }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn into_pending(self) -> BTreeMap<Key, Status> {
        self.pending
    }

    pub fn commit(self) -> Vec<(Key, Status)> {
        self.pending.into_iter().collect()
    }
}

impl<S: ReadState + ?Sized> ReadState for Layer<'_, S> {
    fn get(&self, key: &Key) -> Result<Option<Value>> {
        Ok(match self.pending.get(key) {
            Some(Status::Update(value)) => Some(value.clone()),
            Some(Status::Delete) => None,
            None => self.state.get(key)?,
        })
    }
}

impl<S: ReadState + ?Sized> State for Layer<'_, S> {
    fn insert(&mut self, key: Key, value: Value) -> Result<()> {
        self.pending.insert(key, Status::Update(value));
        Ok(())
    }

    fn delete(&mut self, key: &Key) -> Result<()> {
        self.pending.insert(key.clone(), Status::Delete);
        Ok(())
    }
}

pub fn load_account<S: ReadState + ?Sized>(
    state: &S,
    public: &PublicKey,
) -> Result<Option<Account>> {
    match state.get(&Key::Account(public.clone()))? {
        Some(Value::Account(account)) => Ok(Some(account)),
        None => Ok(None),
        Some(other) => bail!("account slot holds {other:?}"),
    }
}

pub fn load_bandwidth<S: ReadState + ?Sized>(
    state: &S,
    public: &PublicKey,
) -> Result<Option<AccountBandwidth>> {
    match state.get(&Key::Bandwidth(public.clone()))? {
        Some(Value::Bandwidth(bandwidth)) => Ok(Some(bandwidth)),
        None => Ok(None),
        Some(other) => bail!("bandwidth slot holds {other:?}"),
    }
}

pub fn load_link_count<S: ReadState + ?Sized>(state: &S) -> Result<u64> {
    match state.get(&Key::LinkCount)? {
        Some(Value::LinkCount(count)) => Ok(count),
        None => Ok(0),
        Some(other) => bail!("link count slot holds {other:?}"),
    }
}

pub fn load_bandwidth_params<S: ReadState + ?Sized>(state: &S) -> Result<Option<BandwidthParams>> {
    match state.get(&Key::BandwidthParams)? {
        Some(Value::BandwidthParams(params)) => Ok(Some(params)),
        None => Ok(None),
        Some(other) => bail!("bandwidth params slot holds {other:?}"),
    }
}

pub fn load_model_params<S: ReadState + ?Sized>(state: &S) -> Result<Option<ModelParams>> {
    match state.get(&Key::ModelParams)? {
        Some(Value::ModelParams(params)) => Ok(Some(params)),
        None => Ok(None),
        Some(other) => bail!("model params slot holds {other:?}"),
    }
}

pub fn load_rank_params<S: ReadState + ?Sized>(state: &S) -> Result<Option<RankParams>> {
    match state.get(&Key::RankParams)? {
        Some(Value::RankParams(params)) => Ok(Some(params)),
        None => Ok(None),
        Some(other) => bail!("rank params slot holds {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Memory;

    #[test]
    fn test_layer_reads_through_and_shadows() {
        let mut base = Memory::default();
        base.insert(Key::LinkCount, Value::LinkCount(3)).unwrap();
        base.insert(Key::RankParams, Value::RankParams(RankParams { calculation_period: 5 }))
            .unwrap();

        let mut layer = Layer::new(&base);
        assert_eq!(load_link_count(&layer).unwrap(), 3);

        layer.insert(Key::LinkCount, Value::LinkCount(4)).unwrap();
        layer.delete(&Key::RankParams).unwrap();
        assert_eq!(load_link_count(&layer).unwrap(), 4);
        assert_eq!(load_rank_params(&layer).unwrap(), None);

        // Base is untouched until the changes are applied
        assert_eq!(load_link_count(&base).unwrap(), 3);
        let changes = layer.commit();
        base.apply(changes).unwrap();
        assert_eq!(load_link_count(&base).unwrap(), 4);
        assert_eq!(load_rank_params(&base).unwrap(), None);
    }

    #[test]
    fn test_nested_layer_dropped_on_failure() {
        let base = Memory::default();
        let mut outer = Layer::new(&base);
        outer.insert(Key::LinkCount, Value::LinkCount(1)).unwrap();
        {
            let mut inner = Layer::new(&outer);
            inner.insert(Key::LinkCount, Value::LinkCount(2)).unwrap();
            assert_eq!(load_link_count(&inner).unwrap(), 2);
        }
        assert_eq!(load_link_count(&outer).unwrap(), 1);
    }

    #[test]
    fn test_mismatched_slot_is_an_error() {
        let mut base = Memory::default();
        base.insert(Key::LinkCount, Value::Edge(0)).unwrap();
        assert!(load_link_count(&base).is_err());
    }
}
