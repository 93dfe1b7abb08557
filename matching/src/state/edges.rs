//! The edge store: a fixed-order struct-of-arrays over this worker's edge
//! slice, with a global-id lookup rebuilt only between phases.

use std::collections::HashMap;

use crate::hashing::KeyedHasher;
use crate::protocol::EdgeRecord;

/// One confirmed match, in output form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MatchedEdge {
    /// One endpoint.
    pub u: u64,
    /// The other endpoint.
    pub v: u64,
    /// The symmetric global identifier.
    pub eid: u64,
}

/// This worker's edges in struct-of-arrays layout.
///
/// Positions are stable for the duration of a phase; compaction (and with it
/// any position churn) happens only between phases.
pub struct EdgeStore {
    endpoints: Vec<(u64, u64)>,
    eids: Vec<u64>,
    active: Vec<bool>,
    deg_in_sparse: Vec<u64>,
    stalled: Vec<bool>,
    priority: Vec<u64>,
    id_to_index: HashMap<u64, usize>,
    active_count: usize,
    matched: Vec<MatchedEdge>,
    dropped: u64,
}

impl EdgeStore {
    /// Builds the store from routed edge records, defensively dropping
    /// duplicates and self-loops the ingestion collaborator should have
    /// removed.
    ///
    /// Rows are laid out in ascending eid order, so local positions do not
    /// depend on the order edges were ingested.
    pub fn from_records(mut records: Vec<EdgeRecord>) -> Self {
        records.sort_unstable_by_key(|record| record.eid);
        let mut store = EdgeStore {
            endpoints: Vec::with_capacity(records.len()),
            eids: Vec::with_capacity(records.len()),
            active: Vec::new(),
            deg_in_sparse: Vec::new(),
            stalled: Vec::new(),
            priority: Vec::new(),
            id_to_index: HashMap::with_capacity(records.len()),
            active_count: 0,
            matched: Vec::new(),
            dropped: 0,
        };
        for record in records {
            if record.u == record.v || store.id_to_index.contains_key(&record.eid) {
                store.dropped += 1;
                continue;
            }
            let index = store.endpoints.len();
            store.id_to_index.insert(record.eid, index);
            store.endpoints.push((record.u, record.v));
            store.eids.push(record.eid);
        }
        let len = store.endpoints.len();
        store.active = vec![true; len];
        store.deg_in_sparse = vec![0; len];
        store.stalled = vec![false; len];
        store.priority = vec![0; len];
        store.active_count = len;
        store
    }

    /// Number of stored edges, active or not.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether the store holds no edges.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Number of active edges.
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Fraction of stored rows still active.
    pub fn active_fraction(&self) -> f64 {
        if self.endpoints.is_empty() {
            1.0
        } else {
            self.active_count as f64 / self.endpoints.len() as f64
        }
    }

    /// Inputs dropped at construction.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// The endpoints of the edge at `index`.
    pub fn endpoints(&self, index: usize) -> (u64, u64) {
        self.endpoints[index]
    }

    /// The global identifier of the edge at `index`.
    pub fn eid(&self, index: usize) -> u64 {
        self.eids[index]
    }

    /// Whether the edge at `index` is still in the graph.
    pub fn is_active(&self, index: usize) -> bool {
        self.active[index]
    }

    /// Whether the edge at `index` is stalled for this phase.
    pub fn is_stalled(&self, index: usize) -> bool {
        self.stalled[index]
    }

    /// Stalls the edge at `index` for this phase.
    pub fn set_stalled(&mut self, index: usize) {
        self.stalled[index] = true;
    }

    /// This phase's sparse degree of the edge at `index`.
    pub fn deg_in_sparse(&self, index: usize) -> u64 {
        self.deg_in_sparse[index]
    }

    /// Accumulates one endpoint's sparse-degree contribution.
    pub fn add_deg_in_sparse(&mut self, index: usize, count: u64) {
        self.deg_in_sparse[index] += count;
    }

    /// This phase's priority of the edge at `index`.
    pub fn priority(&self, index: usize) -> u64 {
        self.priority[index]
    }

    /// The local position of `eid`, live or dead.
    pub fn lookup(&self, eid: u64) -> Option<usize> {
        self.id_to_index.get(&eid).copied()
    }

    /// The local position of `eid`, if it is still active.
    pub fn lookup_active(&self, eid: u64) -> Option<usize> {
        self.lookup(eid).filter(|&index| self.active[index])
    }

    /// Positions of all active edges, ascending.
    pub fn active_indices(&self) -> Vec<usize> {
        (0..self.endpoints.len())
            .filter(|&index| self.active[index])
            .collect()
    }

    /// Resets phase-local state and assigns this phase's priorities to
    /// active edges.
    pub fn begin_phase(&mut self, hasher: &KeyedHasher, phase: u64) {
        for index in 0..self.endpoints.len() {
            self.stalled[index] = false;
            self.deg_in_sparse[index] = 0;
            if self.active[index] {
                self.priority[index] = hasher.priority(self.eids[index], phase);
            }
        }
    }

    /// Removes the edge at `index` from the active set. Returns whether it
    /// was active.
    pub fn deactivate(&mut self, index: usize) -> bool {
        if self.active[index] {
            self.active[index] = false;
            self.active_count -= 1;
            true
        } else {
            false
        }
    }

    /// Confirms the edge at `index` as matched: it leaves the active set
    /// and joins the output, both exactly once.
    pub fn record_match(&mut self, index: usize) {
        debug_assert!(self.active[index], "matching an inactive edge");
        let (u, v) = self.endpoints[index];
        self.matched.push(MatchedEdge {
            u,
            v,
            eid: self.eids[index],
        });
        self.deactivate(index);
    }

    /// The matches confirmed so far on this worker.
    pub fn matched(&self) -> &[MatchedEdge] {
        &self.matched
    }

    /// Drops inactive rows and rebuilds the id lookup. Must only run
    /// between phases; matched output is unaffected.
    pub fn compact(&mut self) {
        let mut endpoints = Vec::with_capacity(self.active_count);
        let mut eids = Vec::with_capacity(self.active_count);
        for index in 0..self.endpoints.len() {
            if self.active[index] {
                endpoints.push(self.endpoints[index]);
                eids.push(self.eids[index]);
            }
        }
        self.id_to_index = eids
            .iter()
            .enumerate()
            .map(|(index, &eid)| (eid, index))
            .collect();
        let len = endpoints.len();
        self.endpoints = endpoints;
        self.eids = eids;
        self.active = vec![true; len];
        self.deg_in_sparse = vec![0; len];
        self.stalled = vec![false; len];
        self.priority = vec![0; len];
        self.active_count = len;
    }
}
