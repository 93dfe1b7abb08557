//! The per-worker state store: edge slice, owned vertices, and ball
//! storage, plus ingestion routing and init-time vertex resolution.

pub mod balls;
pub mod edges;
pub mod vertices;

pub use balls::{merge_sorted_unique, BallArena};
pub use edges::{EdgeStore, MatchedEdge};
pub use vertices::{IncidentEdge, VertexStore};

use matching_communication::Fabric;

use crate::error::EngineError;
use crate::hashing::KeyedHasher;
use crate::protocol::{Announce, EdgeRecord, CHANNEL_ANNOUNCE, CHANNEL_INGEST};

/// Every 16th edge gets its identifier re-derived with swapped endpoints.
const SYMMETRY_SAMPLE_STRIDE: usize = 16;

/// The state owned by one worker.
pub struct StateStore {
    /// This worker's edge slice.
    pub edges: EdgeStore,
    /// This worker's vertex slice.
    pub vertices: VertexStore,
}

/// Routes raw `(u, v)` pairs to their owning workers.
///
/// The ingestion collaborator may hand any worker any pairs; after this
/// exchange each worker holds exactly the edges it owns, with identifiers
/// attached.
pub fn distribute<F: Fabric>(
    fabric: &mut F,
    hasher: &KeyedHasher,
    pairs: Vec<(u64, u64)>,
) -> Result<Vec<EdgeRecord>, EngineError> {
    let peers = fabric.peers();
    let mut sends: Vec<Vec<EdgeRecord>> = (0..peers).map(|_| Vec::new()).collect();
    for (u, v) in pairs {
        let eid = hasher.edge_id(u, v);
        sends[hasher.edge_owner(eid, peers)].push(EdgeRecord { u, v, eid });
    }
    let received = fabric.exchange(CHANNEL_INGEST, sends)?;
    Ok(received.into_iter().flatten().collect())
}

impl StateStore {
    /// Builds the stores from routed records, resolving vertex ownership
    /// with one exchange and sampling the symmetric-identifier invariant.
    pub fn init<F: Fabric>(
        fabric: &mut F,
        hasher: &KeyedHasher,
        records: Vec<EdgeRecord>,
    ) -> Result<StateStore, EngineError> {
        let edges = EdgeStore::from_records(records);

        for index in (0..edges.len()).step_by(SYMMETRY_SAMPLE_STRIDE) {
            let (u, v) = edges.endpoints(index);
            if hasher.edge_id(v, u) != edges.eid(index) {
                return Err(EngineError::SymmetricIdFailure { u, v });
            }
        }

        let peers = fabric.peers();
        let mut sends: Vec<Vec<Announce>> = (0..peers).map(|_| Vec::new()).collect();
        for index in 0..edges.len() {
            let (u, v) = edges.endpoints(index);
            sends[hasher.vertex_owner(u, peers)].push(Announce { vertex: u });
            sends[hasher.vertex_owner(v, peers)].push(Announce { vertex: v });
        }
        let received = fabric.exchange(CHANNEL_ANNOUNCE, sends)?;
        let owned: Vec<u64> = received
            .into_iter()
            .flatten()
            .map(|announce| announce.vertex)
            .collect();

        let vertices = VertexStore::new(owned, &edges);
        Ok(StateStore { edges, vertices })
    }

    /// Compacts the edge store between phases once the active fraction
    /// drops below `threshold`. Never called inside a phase.
    pub fn compact_if_needed(&mut self, threshold: f64) -> bool {
        if self.edges.is_empty() || self.edges.active_fraction() >= threshold {
            return false;
        }
        self.edges.compact();
        self.vertices.rebuild_csr(&self.edges);
        true
    }

    /// Releases transient allocations under soft memory pressure.
    pub fn relieve(&mut self) {
        self.vertices.relieve();
    }
}
