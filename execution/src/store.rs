//! Committed, versioned state.
//!
//! [Memory] keeps committed versions of every key so that a read-only view at
//! an older height can be served (see [Store::snapshot]). Versions only needed
//! by snapshots below the last round boundary are dropped by [Store::prune].
//!
//! [Journal] adds durability on top of a `commonware-storage` variable journal:
//! each commit is appended as a commit frame, and each prune appends a
//! checkpoint frame holding the retained history before the log is pruned up
//! to it. Opening replays from the oldest retained frame.

use crate::state::{ReadState, State, Status};
use anyhow::{ensure, Context as _, Result};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, ReadRangeExt, Write};
use commonware_runtime::{buffer::PoolRef, Metrics, Storage};
use commonware_storage::journal::contiguous::variable;
use commonware_utils::{NZUsize, NZU64};
use linkchain_types::{Key, Value};
use std::{collections::BTreeMap, future::Future, num::NonZeroU64, num::NonZeroUsize};
use tracing::{debug, info};

/// Upper bound on the number of changes in a single commit frame.
const MAX_COMMIT_CHANGES: usize = 1 << 24;

/// Upper bound on the number of keys in a checkpoint frame.
const MAX_CHECKPOINT_KEYS: usize = 1 << 26;

/// Upper bound on the number of versions kept for one key in a checkpoint.
const MAX_KEY_VERSIONS: usize = 1 << 20;

const ITEMS_PER_SECTION: NonZeroU64 = NZU64!(4_096);
const WRITE_BUFFER: NonZeroUsize = NZUsize!(1 << 20);
const BUFFER_POOL_PAGE_SIZE: NonZeroUsize = NZUsize!(4_096);
const BUFFER_POOL_CAPACITY: NonZeroUsize = NZUsize!(256);

pub trait Store: ReadState {
    /// Height of the last commit (0 before the first block).
    fn height(&self) -> u64;

    /// Persist `changes` as the state at `height`.
    fn commit(
        &mut self,
        height: u64,
        changes: Vec<(Key, Status)>,
    ) -> impl Future<Output = Result<()>>;

    /// Drop history only needed by snapshots below `boundary`.
    fn prune(&mut self, boundary: u64) -> impl Future<Output = Result<()>>;

    /// Immutable view of the state as committed at `height`.
    fn snapshot(&self, height: u64) -> Result<Box<dyn ReadState + '_>>;
}

/// Multi-version in-memory store.
#[derive(Default)]
pub struct Memory {
    versions: BTreeMap<Key, BTreeMap<u64, Option<Value>>>,
    height: u64,
    pruned: u64,
}

impl Memory {
    fn get_at(&self, key: &Key, height: u64) -> Option<Value> {
        self.versions
            .get(key)?
            .range(..=height)
            .next_back()
            .and_then(|(_, value)| value.clone())
    }

    fn apply_commit(&mut self, height: u64, changes: Vec<(Key, Status)>) -> Result<()> {
        ensure!(
            height > self.height,
            "commit at height {height} does not follow {}",
            self.height
        );
        self.height = height;
        self.apply(changes)
    }

    /// Returns false when nothing new could be dropped.
    fn prune_history(&mut self, boundary: u64) -> bool {
        let boundary = boundary.min(self.height);
        if boundary <= self.pruned {
            return false;
        }
        for history in self.versions.values_mut() {
            // The newest version at or below the boundary is the value seen there
            let keep = history.range(..=boundary).next_back().map(|(v, _)| *v);
            history.retain(|version, _| *version > boundary || Some(*version) == keep);
        }
        self.versions
            .retain(|_, history| history.values().any(Option::is_some));
        self.pruned = boundary;
        true
    }

    /// Lowest height a snapshot can still be taken at.
    pub fn pruned(&self) -> u64 {
        self.pruned
    }

    /// Total number of versions held across all keys.
    pub fn retained(&self) -> usize {
        self.versions.values().map(BTreeMap::len).sum()
    }

    #[cfg(test)]
    pub(crate) fn versions_of(&self, key: &Key) -> usize {
        self.versions.get(key).map_or(0, BTreeMap::len)
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            height: self.height,
            pruned: self.pruned,
            history: self
                .versions
                .iter()
                .map(|(key, versions)| History {
                    key: key.clone(),
                    versions: versions
                        .iter()
                        .map(|(version, value)| {
                            let status = match value {
                                Some(value) => Status::Update(value.clone()),
                                None => Status::Delete,
                            };
                            (*version, status)
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    fn restore(checkpoint: Checkpoint) -> Self {
        let versions = checkpoint
            .history
            .into_iter()
            .map(|History { key, versions }| {
                let versions = versions
                    .into_iter()
                    .map(|(version, status)| match status {
                        Status::Update(value) => (version, Some(value)),
                        Status::Delete => (version, None),
                    })
                    .collect();
                (key, versions)
            })
            .collect();
        Self {
            versions,
            height: checkpoint.height,
            pruned: checkpoint.pruned,
        }
    }
}

impl ReadState for Memory {
    fn get(&self, key: &Key) -> Result<Option<Value>> {
        Ok(self.get_at(key, u64::MAX))
    }
}

/// Direct writes land in the version at the current height.
impl State for Memory {
    fn insert(&mut self, key: Key, value: Value) -> Result<()> {
        self.versions
            .entry(key)
            .or_default()
            .insert(self.height, Some(value));
        Ok(())
    }

    fn delete(&mut self, key: &Key) -> Result<()> {
        if let Some(history) = self.versions.get_mut(key) {
            history.insert(self.height, None);
        }
        Ok(())
    }
}

impl Store for Memory {
    fn height(&self) -> u64 {
        self.height
    }

    async fn commit(&mut self, height: u64, changes: Vec<(Key, Status)>) -> Result<()> {
        self.apply_commit(height, changes)
    }

    async fn prune(&mut self, boundary: u64) -> Result<()> {
        self.prune_history(boundary);
        Ok(())
    }

    fn snapshot(&self, height: u64) -> Result<Box<dyn ReadState + '_>> {
        ensure!(
            height <= self.height,
            "snapshot at {height} is ahead of committed height {}",
            self.height
        );
        ensure!(
            height >= self.pruned,
            "snapshot at {height} was pruned (history starts at {})",
            self.pruned
        );
        Ok(Box::new(Snapshot {
            memory: self,
            height,
        }))
    }
}

struct Snapshot<'a> {
    memory: &'a Memory,
    height: u64,
}

impl ReadState for Snapshot<'_> {
    fn get(&self, key: &Key) -> Result<Option<Value>> {
        Ok(self.memory.get_at(key, self.height))
    }
}

/// Every retained version of one key.
#[derive(Clone, Debug, PartialEq, Eq)]
struct History {
    key: Key,
    versions: Vec<(u64, Status)>,
}

impl Write for History {
    fn write(&self, writer: &mut impl BufMut) {
        self.key.write(writer);
        self.versions.write(writer);
    }
}

impl Read for History {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            key: Key::read(reader)?,
            versions: Vec::<(u64, Status)>::read_range(reader, 1..=MAX_KEY_VERSIONS)?,
        })
    }
}

impl EncodeSize for History {
    fn encode_size(&self) -> usize {
        self.key.encode_size() + self.versions.encode_size()
    }
}

/// Full retained history as of a prune.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Checkpoint {
    height: u64,
    pruned: u64,
    history: Vec<History>,
}

impl Write for Checkpoint {
    fn write(&self, writer: &mut impl BufMut) {
        self.height.write(writer);
        self.pruned.write(writer);
        self.history.write(writer);
    }
}

impl Read for Checkpoint {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let height = u64::read(reader)?;
        let pruned = u64::read(reader)?;
        if pruned > height {
            return Err(Error::Invalid("Checkpoint", "pruned above height"));
        }
        Ok(Self {
            height,
            pruned,
            history: Vec::<History>::read_range(reader, 0..=MAX_CHECKPOINT_KEYS)?,
        })
    }
}

impl EncodeSize for Checkpoint {
    fn encode_size(&self) -> usize {
        self.height.encode_size() + self.pruned.encode_size() + self.history.encode_size()
    }
}

/// One journal entry.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Frame {
    Commit {
        height: u64,
        changes: Vec<(Key, Status)>,
    },
    Checkpoint(Checkpoint),
}

impl Write for Frame {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Frame::Commit { height, changes } => {
                0u8.write(writer);
                height.write(writer);
                changes.write(writer);
            }
            Frame::Checkpoint(checkpoint) => {
                1u8.write(writer);
                checkpoint.write(writer);
            }
        }
    }
}

impl Read for Frame {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let kind = u8::read(reader)?;
        match kind {
            0 => Ok(Frame::Commit {
                height: u64::read(reader)?,
                changes: Vec::<(Key, Status)>::read_range(reader, 0..=MAX_COMMIT_CHANGES)?,
            }),
            1 => Ok(Frame::Checkpoint(Checkpoint::read(reader)?)),
            _ => Err(Error::InvalidEnum(kind)),
        }
    }
}

impl EncodeSize for Frame {
    fn encode_size(&self) -> usize {
        1 + match self {
            Frame::Commit { height, changes } => height.encode_size() + changes.encode_size(),
            Frame::Checkpoint(checkpoint) => checkpoint.encode_size(),
        }
    }
}

/// Durable store backed by a checksummed variable journal.
///
/// A frame is synced before it is applied in memory. A corrupt or torn
/// frame is rejected by the journal rather than replayed.
pub struct Journal<E: Storage + Metrics> {
    memory: Memory,
    log: variable::Journal<E, Frame>,
}

impl<E: Storage + Metrics> Journal<E> {
    pub async fn init(context: E, partition: &str) -> Result<Self> {
        let log = variable::Journal::init(
            context.with_label("frames"),
            variable::Config {
                partition: partition.to_string(),
                items_per_section: ITEMS_PER_SECTION,
                compression: None,
                codec_config: (),
                buffer_pool: PoolRef::new(BUFFER_POOL_PAGE_SIZE, BUFFER_POOL_CAPACITY),
                write_buffer: WRITE_BUFFER,
            },
        )
        .await
        .with_context(|| format!("open journal {partition}"))?;

        let mut memory = Memory::default();
        let size = log.size();
        let oldest = log.oldest_retained_pos().unwrap_or(size);
        for position in oldest..size {
            let frame = log
                .read(position)
                .await
                .with_context(|| format!("read journal frame {position}"))?;
            match frame {
                Frame::Commit { height, changes } => memory
                    .apply_commit(height, changes)
                    .with_context(|| format!("replay journal frame {position}"))?,
                Frame::Checkpoint(checkpoint) => memory = Memory::restore(checkpoint),
            }
        }
        info!(
            partition,
            frames = size - oldest,
            height = memory.height,
            pruned = memory.pruned(),
            "journal replayed"
        );

        Ok(Self { memory, log })
    }

    async fn append(&mut self, frame: Frame) -> Result<u64> {
        let position = self
            .log
            .append(frame)
            .await
            .context("append journal frame")?;
        self.log.sync().await.context("sync journal")?;
        Ok(position)
    }
}

impl<E: Storage + Metrics> ReadState for Journal<E> {
    fn get(&self, key: &Key) -> Result<Option<Value>> {
        self.memory.get(key)
    }
}

impl<E: Storage + Metrics> Store for Journal<E> {
    fn height(&self) -> u64 {
        self.memory.height
    }

    async fn commit(&mut self, height: u64, changes: Vec<(Key, Status)>) -> Result<()> {
        ensure!(
            height > self.memory.height,
            "commit at height {height} does not follow {}",
            self.memory.height
        );
        self.append(Frame::Commit {
            height,
            changes: changes.clone(),
        })
        .await?;
        self.memory.apply_commit(height, changes)
    }

    async fn prune(&mut self, boundary: u64) -> Result<()> {
        if !self.memory.prune_history(boundary) {
            return Ok(());
        }
        let checkpoint = Frame::Checkpoint(self.memory.checkpoint());
        let position = self.append(checkpoint).await?;
        self.log
            .prune(position)
            .await
            .context("prune journal")?;
        debug!(
            boundary,
            position,
            versions = self.memory.retained(),
            "journal pruned"
        );
        Ok(())
    }

    fn snapshot(&self, height: u64) -> Result<Box<dyn ReadState + '_>> {
        self.memory.snapshot(height)
    }
}
