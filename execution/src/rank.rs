//! Rank engine: scores every CID from the link graph once per round.

use crate::round_scheduler::RoundScheduler;
use anyhow::Result;
use commonware_codec::Encode;
use commonware_cryptography::{
    sha256::{Digest, Sha256},
    Hasher,
};
use linkchain_types::{Cid, Event, Link};
use std::{collections::BTreeMap, fmt, num::NonZeroU64, str::FromStr};
use thiserror::Error;
use tracing::{info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Where rank calculation runs. Both produce identical results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ComputeUnit {
    #[default]
    Cpu,
    /// Thread pool (requires the `parallel` feature).
    Parallel,
}

impl ComputeUnit {
    pub fn available(&self) -> bool {
        match self {
            Self::Cpu => true,
            Self::Parallel => cfg!(feature = "parallel"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown compute unit {0:?} (expected \"cpu\" or \"parallel\")")]
pub struct UnknownComputeUnit(pub String);

impl FromStr for ComputeUnit {
    type Err = UnknownComputeUnit;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "parallel" | "gpu" => Ok(Self::Parallel),
            _ => Err(UnknownComputeUnit(value.to_string())),
        }
    }
}

impl fmt::Display for ComputeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Parallel => write!(f, "parallel"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("search is disabled on this node")]
    Disabled,
}

pub trait RankEngine: Send + Sync {
    /// Restore the rank computed at round `boundary` from the links that
    /// existed then. `height` is the last committed block; `rounds` decides
    /// which heights recalculate from here on.
    fn load(
        &mut self,
        links: &[Link],
        boundary: u64,
        height: u64,
        rounds: RoundScheduler,
    ) -> Result<()>;

    /// Called once per block with every link known so far. Recalculates at
    /// round boundaries.
    fn end_block(&mut self, height: u64, links: &[Link]) -> Option<Event>;

    fn digest(&self) -> Digest;

    /// Last block processed by [RankEngine::end_block] (or restored by load).
    fn height(&self) -> u64;

    fn rank(&self, cid: &Cid) -> u64;

    /// Outgoing neighbours of `cid`, best ranked first.
    fn search(&self, cid: &Cid, limit: usize) -> Result<Vec<(Cid, u64)>, SearchError>;
}

/// Rank equals the number of distinct incoming links.
pub struct DegreeRank {
    unit: ComputeUnit,
    allow_search: bool,
    rounds: RoundScheduler,

    ranks: BTreeMap<Cid, u64>,
    outgoing: BTreeMap<Cid, Vec<Cid>>,
    digest: Digest,
    height: u64,
    calculated_at: u64,
}

impl DegreeRank {
    pub fn new(unit: ComputeUnit, allow_search: bool) -> Self {
        let unit = if unit.available() {
            unit
        } else {
            warn!(%unit, "compute unit unavailable; falling back to cpu");
            ComputeUnit::Cpu
        };
        Self {
            unit,
            allow_search,
            rounds: RoundScheduler::new(NonZeroU64::MIN),
            ranks: BTreeMap::new(),
            outgoing: BTreeMap::new(),
            digest: Self::hash(&BTreeMap::new()),
            height: 0,
            calculated_at: 0,
        }
    }

    pub fn calculated_at(&self) -> u64 {
        self.calculated_at
    }

    fn in_degrees(&self, links: &[Link]) -> BTreeMap<Cid, u64> {
        match self.unit {
            #[cfg(feature = "parallel")]
            ComputeUnit::Parallel => links
                .par_iter()
                .fold(BTreeMap::new, |mut ranks, link| {
                    ranks.entry(link.from.clone()).or_insert(0);
                    *ranks.entry(link.to.clone()).or_insert(0) += 1;
                    ranks
                })
                .reduce(BTreeMap::new, |mut left, right| {
                    for (cid, rank) in right {
                        *left.entry(cid).or_insert(0) += rank;
                    }
                    left
                }),
            _ => {
                let mut ranks = BTreeMap::new();
                for link in links {
                    ranks.entry(link.from.clone()).or_insert(0u64);
                    *ranks.entry(link.to.clone()).or_insert(0) += 1;
                }
                ranks
            }
        }
    }

    fn hash(ranks: &BTreeMap<Cid, u64>) -> Digest {
        let mut hasher = Sha256::new();
        for (cid, rank) in ranks {
            hasher.update(&cid.encode());
            hasher.update(&rank.to_be_bytes());
        }
        hasher.finalize()
    }

    fn calculate(&mut self, links: &[Link], height: u64) {
        self.ranks = self.in_degrees(links);
        self.digest = Self::hash(&self.ranks);
        self.calculated_at = height;

        self.outgoing.clear();
        if self.allow_search {
            for link in links {
                self.outgoing
                    .entry(link.from.clone())
                    .or_default()
                    .push(link.to.clone());
            }
            let ranks = &self.ranks;
            for targets in self.outgoing.values_mut() {
                targets.sort_by(|a, b| {
                    let rank = |cid: &Cid| ranks.get(cid).copied().unwrap_or_default();
                    rank(b).cmp(&rank(a)).then_with(|| a.cmp(b))
                });
            }
        }
    }
}

impl RankEngine for DegreeRank {
    fn load(
        &mut self,
        links: &[Link],
        boundary: u64,
        height: u64,
        rounds: RoundScheduler,
    ) -> Result<()> {
        self.rounds = rounds;
        if rounds.is_calculation_height(boundary) {
            self.calculate(links, boundary);
        } else {
            self.calculate(&[], 0);
        }
        self.height = height;
        info!(
            boundary,
            height,
            cids = self.ranks.len(),
            unit = %self.unit,
            search = self.allow_search,
            "rank loaded"
        );
        Ok(())
    }

    fn end_block(&mut self, height: u64, links: &[Link]) -> Option<Event> {
        self.height = height;
        if !self.rounds.is_calculation_height(height) {
            return None;
        }
        self.calculate(links, height);
        info!(height, cids = self.ranks.len(), links = links.len(), "rank calculated");
        Some(Event::RankCalculated {
            height,
            cids: self.ranks.len() as u64,
        })
    }

    fn digest(&self) -> Digest {
        self.digest
    }

    fn height(&self) -> u64 {
        self.height
    }

    fn rank(&self, cid: &Cid) -> u64 {
        self.ranks.get(cid).copied().unwrap_or_default()
    }

    fn search(&self, cid: &Cid, limit: usize) -> Result<Vec<(Cid, u64)>, SearchError> {
        if !self.allow_search {
            return Err(SearchError::Disabled);
        }
        Ok(self
            .outgoing
            .get(cid)
            .map(|targets| {
                targets
                    .iter()
                    .take(limit)
                    .map(|target| (target.clone(), self.rank(target)))
                    .collect()
            })
            .unwrap_or_default())
    }
}
