//! The vertex store: owned vertices with a CSR over locally owned edges,
//! matched bookkeeping, and the phase-local participation incidence.

use std::collections::HashMap;

use crate::error::EngineError;
use crate::state::edges::EdgeStore;

/// One participating edge registered at a vertex for the current phase.
#[derive(Clone, Copy, Debug)]
pub struct IncidentEdge {
    /// The registered edge.
    pub eid: u64,
    /// One endpoint.
    pub u: u64,
    /// The other endpoint.
    pub v: u64,
}

/// The vertices owned by this worker.
///
/// The CSR covers only edges whose owner is this worker; adjacency through
/// remote edges is resolved via the fabric, never stored. The incidence map
/// is phase-local and holds the participating, non-stalled edges registered
/// by sparsification.
pub struct VertexStore {
    ids: Vec<u64>,
    row_of: HashMap<u64, usize>,
    row_start: Vec<usize>,
    neighbors: Vec<usize>,
    matched: Vec<bool>,
    matched_by: Vec<u64>,
    incidence: HashMap<u64, Vec<IncidentEdge>>,
}

impl VertexStore {
    /// Builds the store from the resolved owned-vertex set.
    pub fn new(mut owned: Vec<u64>, edges: &EdgeStore) -> Self {
        owned.sort_unstable();
        owned.dedup();
        let row_of: HashMap<u64, usize> = owned
            .iter()
            .enumerate()
            .map(|(row, &vertex)| (vertex, row))
            .collect();
        let len = owned.len();
        let mut store = VertexStore {
            ids: owned,
            row_of,
            row_start: vec![0; len + 1],
            neighbors: Vec::new(),
            matched: vec![false; len],
            matched_by: vec![u64::MAX; len],
            incidence: HashMap::new(),
        };
        store.rebuild_csr(edges);
        store
    }

    /// Rebuilds the CSR over local edge positions, after init or
    /// compaction.
    pub fn rebuild_csr(&mut self, edges: &EdgeStore) {
        let mut counts = vec![0usize; self.ids.len()];
        for index in 0..edges.len() {
            let (u, v) = edges.endpoints(index);
            if let Some(&row) = self.row_of.get(&u) {
                counts[row] += 1;
            }
            if let Some(&row) = self.row_of.get(&v) {
                counts[row] += 1;
            }
        }
        self.row_start = vec![0; self.ids.len() + 1];
        for row in 0..counts.len() {
            self.row_start[row + 1] = self.row_start[row] + counts[row];
        }
        self.neighbors = vec![0; self.row_start[self.ids.len()]];
        let mut cursor = self.row_start.clone();
        for index in 0..edges.len() {
            let (u, v) = edges.endpoints(index);
            if let Some(&row) = self.row_of.get(&u) {
                self.neighbors[cursor[row]] = index;
                cursor[row] += 1;
            }
            if let Some(&row) = self.row_of.get(&v) {
                self.neighbors[cursor[row]] = index;
                cursor[row] += 1;
            }
        }
    }

    /// Number of owned vertices.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the store owns no vertices.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The row of `vertex`, or `MalformedGraph` if it is not owned here.
    pub fn row(&self, vertex: u64) -> Result<usize, EngineError> {
        self.row_of
            .get(&vertex)
            .copied()
            .ok_or(EngineError::MalformedGraph { vertex })
    }

    /// The vertex id at `row`.
    pub fn id(&self, row: usize) -> u64 {
        self.ids[row]
    }

    /// Local edge positions incident to the vertex at `row`.
    pub fn local_edges(&self, row: usize) -> &[usize] {
        &self.neighbors[self.row_start[row]..self.row_start[row + 1]]
    }

    /// Whether the vertex at `row` is matched.
    pub fn is_matched(&self, row: usize) -> bool {
        self.matched[row]
    }

    /// The edge that matched the vertex at `row`, if any.
    pub fn matched_by(&self, row: usize) -> Option<u64> {
        if self.matched[row] {
            Some(self.matched_by[row])
        } else {
            None
        }
    }

    /// Records a confirmed match of `vertex` by `eid`.
    ///
    /// A second confirmation is a violated matching invariant.
    pub fn confirm_match(&mut self, vertex: u64, eid: u64) -> Result<(), EngineError> {
        let row = self.row(vertex)?;
        if self.matched[row] {
            return Err(EngineError::InvariantViolation(format!(
                "vertex {} matched by {:#x} and {:#x}",
                vertex, self.matched_by[row], eid
            )));
        }
        self.matched[row] = true;
        self.matched_by[row] = eid;
        Ok(())
    }

    /// Clears the phase-local incidence.
    pub fn begin_phase(&mut self) {
        self.incidence.clear();
    }

    /// Registers a participating edge at `vertex` for this phase.
    pub fn register(&mut self, vertex: u64, incident: IncidentEdge) -> Result<(), EngineError> {
        self.row(vertex)?;
        self.incidence.entry(vertex).or_default().push(incident);
        Ok(())
    }

    /// Withdraws a stalled edge's registration at `vertex`.
    pub fn retract(&mut self, vertex: u64, eid: u64) -> Result<(), EngineError> {
        self.row(vertex)?;
        if let Some(list) = self.incidence.get_mut(&vertex) {
            list.retain(|incident| incident.eid != eid);
        }
        Ok(())
    }

    /// The participating edges registered at `vertex`.
    pub fn incidence(&self, vertex: u64) -> &[IncidentEdge] {
        self.incidence
            .get(&vertex)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Iterates over vertices with registered participants.
    pub fn incidence_iter(&self) -> impl Iterator<Item = (u64, &[IncidentEdge])> + '_ {
        self.incidence
            .iter()
            .map(|(&vertex, list)| (vertex, list.as_slice()))
    }

    /// Drops incidence entries touching newly matched vertices.
    ///
    /// `newly_matched` must be sorted; it is the globally reduced set, so
    /// remote endpoints prune correctly too.
    pub fn prune_matched(&mut self, newly_matched: &[u64]) {
        let hit = |vertex: u64| newly_matched.binary_search(&vertex).is_ok();
        self.incidence.retain(|&vertex, list| {
            if hit(vertex) {
                return false;
            }
            list.retain(|incident| !hit(incident.u) && !hit(incident.v));
            !list.is_empty()
        });
    }

    /// Shrinks transient allocations; called by the memory guard.
    pub fn relieve(&mut self) {
        for list in self.incidence.values_mut() {
            list.shrink_to_fit();
        }
        self.incidence.shrink_to_fit();
    }
}
