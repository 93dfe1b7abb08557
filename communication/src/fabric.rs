//! The collective exchange contract shared by all transports.

use std::fmt;

use crate::counters::Counters;
use crate::Data;

/// Default bound on a single transported buffer, in bytes.
///
/// Logical exchanges larger than this are split into several chunk messages,
/// keeping every buffer comfortably below the 2 GiB limits of legacy
/// transports with 32-bit counts.
pub const CHUNK_LIMIT: usize = 256 * 1024 * 1024;

/// Channels below this identifier are reserved for the fabric's own
/// collectives; engine channels must start here.
pub const RESERVED_CHANNELS: usize = 8;

/// Reserved channel for reductions (sum, max).
pub const CHANNEL_REDUCE: usize = 0;
/// Reserved channel for sorted-set unions.
pub const CHANNEL_UNION: usize = 1;
/// Reserved channel for gathers to a single root.
pub const CHANNEL_GATHER: usize = 2;
/// Reserved channel for broadcasts from a single root.
pub const CHANNEL_BROADCAST: usize = 3;
/// Reserved channel for barriers.
pub const CHANNEL_BARRIER: usize = 4;

/// Failures surfaced by fabric calls.
///
/// Both variants are fatal: the engine never retries a fabric call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FabricError {
    /// A worker requested a coordinated abort; the payload is its reason.
    Aborted(String),
    /// The transport failed (a peer disconnected or misbehaved).
    Transport(String),
}

impl fmt::Display for FabricError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FabricError::Aborted(reason) => write!(f, "coordinated abort: {}", reason),
            FabricError::Transport(reason) => write!(f, "transport failure: {}", reason),
        }
    }
}

impl std::error::Error for FabricError {}

/// A collective exchange endpoint held by one worker.
///
/// All methods are collectives: every worker must call the same method with
/// the same channel identifier in the same order, and a call returns only
/// once the exchange has globally succeeded. There is some feature creep, in
/// that the reductions and gathers are conveniences derived from `exchange`;
/// they are provided here so every transport shares one implementation.
pub trait Fabric {
    /// The index of this worker out of `(0..self.peers())`.
    fn index(&self) -> usize;

    /// The number of workers.
    fn peers(&self) -> usize;

    /// Exchanges one typed bucket per peer for one typed bucket per peer.
    ///
    /// `sends[peer]` is delivered to `peer` in order; the result's entry `i`
    /// holds the records sent by worker `i`, in their send order. No ordering
    /// across sources is promised. The `identifier` names the logical
    /// channel; a given identifier must always carry the same record type.
    fn exchange<T: Data>(
        &mut self,
        identifier: usize,
        sends: Vec<Vec<T>>,
    ) -> Result<Vec<Vec<T>>, FabricError>;

    /// Requests a coordinated abort, observed by all peers in their next
    /// (or current) fabric call.
    fn abort(&mut self, reason: String);

    /// Traffic accounting for this endpoint.
    fn counters(&mut self) -> &mut Counters;

    /// Blocks until all workers have reached this barrier.
    fn barrier(&mut self) -> Result<(), FabricError> {
        let empties = (0..self.peers()).map(|_| Vec::new()).collect();
        self.exchange::<u64>(CHANNEL_BARRIER, empties).map(|_| ())
    }

    /// Sums `value` over all workers.
    fn allreduce_sum(&mut self, value: u64) -> Result<u64, FabricError> {
        let contributions = self.exchange(CHANNEL_REDUCE, vec![vec![value]; self.peers()])?;
        Ok(contributions.into_iter().flatten().sum())
    }

    /// Maximum of `value` over all workers.
    fn allreduce_max(&mut self, value: u64) -> Result<u64, FabricError> {
        let contributions = self.exchange(CHANNEL_REDUCE, vec![vec![value]; self.peers()])?;
        Ok(contributions.into_iter().flatten().max().unwrap_or(0))
    }

    /// Union of sorted duplicate-free sets over all workers.
    ///
    /// The contribution need not be sorted; the result always is.
    fn allreduce_union(&mut self, mut values: Vec<u64>) -> Result<Vec<u64>, FabricError> {
        values.sort_unstable();
        values.dedup();
        let contributions = self.exchange(CHANNEL_UNION, vec![values; self.peers()])?;
        let mut union: Vec<u64> = contributions.into_iter().flatten().collect();
        union.sort_unstable();
        union.dedup();
        Ok(union)
    }

    /// Gathers every worker's words at `root`, concatenated by source rank.
    ///
    /// Non-root workers receive an empty result.
    fn gather(&mut self, root: usize, words: Vec<u64>) -> Result<Vec<u64>, FabricError> {
        let mut sends: Vec<Vec<u64>> = (0..self.peers()).map(|_| Vec::new()).collect();
        sends[root] = words;
        let received = self.exchange(CHANNEL_GATHER, sends)?;
        Ok(received.into_iter().flatten().collect())
    }

    /// Broadcasts `root`'s words to every worker.
    ///
    /// Non-root contributions are ignored.
    fn broadcast(&mut self, root: usize, words: Vec<u64>) -> Result<Vec<u64>, FabricError> {
        let sends = if self.index() == root {
            vec![words; self.peers()]
        } else {
            (0..self.peers()).map(|_| Vec::new()).collect()
        };
        let received = self.exchange(CHANNEL_BROADCAST, sends)?;
        Ok(received.into_iter().flatten().collect())
    }
}
