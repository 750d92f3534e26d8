//! Link index: every edge ever created, in commit order, plus a running digest.

use crate::state::{load_link_count, ReadState};
use anyhow::{anyhow, bail, Result};
use commonware_codec::Encode;
use commonware_cryptography::{
    sha256::{Digest, Sha256},
    Hasher,
};
use linkchain_types::{Key, Link, Value};
use tracing::info;

pub trait LinkIndex: Send + Sync {
    /// Rebuild from committed state. `boundary` is the state at the last round
    /// boundary and `latest` the state at `height`; links past the boundary
    /// are read from `latest`.
    fn load(&mut self, boundary: &dyn ReadState, latest: &dyn ReadState, height: u64) -> Result<()>;

    /// Record links created by a delivered transaction.
    fn append(&mut self, links: &[Link]);

    /// Fold appended links into the digest.
    fn commit(&mut self, height: u64);

    /// Every known link, committed first, then those appended since the last commit.
    fn links(&self) -> &[Link];

    fn digest(&self) -> Digest;

    /// Height of the last commit.
    fn height(&self) -> u64;
}

fn read_link(state: &dyn ReadState, index: u64) -> Result<Link> {
    match state.get(&Key::LinkAt(index))? {
        Some(Value::LinkAt(link)) => Ok(link),
        Some(other) => bail!("link slot {index} holds {other:?}"),
        None => Err(anyhow!("link {index} missing")),
    }
}

/// Hash chain over links: `d' = sha256(d || from || to)` starting from `sha256("")`.
pub struct MemoryLinkIndex {
    links: Vec<Link>,
    committed: usize,
    digest: Digest,
    height: u64,
}

impl Default for MemoryLinkIndex {
    fn default() -> Self {
        Self {
            links: Vec::new(),
            committed: 0,
            digest: Sha256::hash(&[]),
            height: 0,
        }
    }
}

impl MemoryLinkIndex {
    fn chain(digest: &Digest, link: &Link) -> Digest {
        let mut hasher = Sha256::new();
        hasher.update(digest.as_ref());
        hasher.update(&link.from.encode());
        hasher.update(&link.to.encode());
        hasher.finalize()
    }
}

impl LinkIndex for MemoryLinkIndex {
    fn load(&mut self, boundary: &dyn ReadState, latest: &dyn ReadState, height: u64) -> Result<()> {
        let at_boundary = load_link_count(boundary)?;
        let at_latest = load_link_count(latest)?;
        if at_latest < at_boundary {
            bail!("link count went backwards: {at_boundary} at boundary, {at_latest} latest");
        }

        *self = Self::default();
        for index in 0..at_boundary {
            self.links.push(read_link(boundary, index)?);
        }
        for index in at_boundary..at_latest {
            self.links.push(read_link(latest, index)?);
        }
        self.commit(height);
        info!(
            height,
            from_boundary = at_boundary,
            from_latest = at_latest - at_boundary,
            "link index loaded"
        );

        Ok(())
    }

    fn append(&mut self, links: &[Link]) {
        self.links.extend_from_slice(links);
    }

    fn commit(&mut self, height: u64) {
        for link in &self.links[self.committed..] {
            self.digest = Self::chain(&self.digest, link);
        }
        self.committed = self.links.len();
        self.height = height;
    }

    fn links(&self) -> &[Link] {
        &self.links
    }

    fn digest(&self) -> Digest {
        self.digest
    }

    fn height(&self) -> u64 {
        self.height
    }
}
