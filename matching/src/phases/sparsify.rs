//! Implicit line-graph sparsification: the degree census, the per-phase
//! participation draw, and sparse-degree aggregation through vertex owners.

use std::collections::HashMap;

use matching_communication::Fabric;

use crate::error::EngineError;
use crate::hashing::KeyedHasher;
use crate::protocol::{
    Census, Participate, SparseDegree, CHANNEL_CENSUS, CHANNEL_DEGREE, CHANNEL_PARTICIPATE,
};
use crate::state::{IncidentEdge, StateStore};

/// Locally observed degree figures, reduced globally by the driver.
#[derive(Clone, Copy, Debug, Default)]
pub struct CensusOutcome {
    /// Largest active degree over owned vertices.
    pub local_max_degree: u64,
    /// Sum of active degrees over owned vertices.
    pub local_degree_sum: u64,
}

/// Counts active incidences at vertex owners.
///
/// Feeds the oracle's degree estimate and the edge-count consistency check.
pub fn census<F: Fabric>(
    fabric: &mut F,
    hasher: &KeyedHasher,
    state: &StateStore,
) -> Result<CensusOutcome, EngineError> {
    let peers = fabric.peers();
    let mut sends: Vec<Vec<Census>> = (0..peers).map(|_| Vec::new()).collect();
    for index in state.edges.active_indices() {
        let (u, v) = state.edges.endpoints(index);
        sends[hasher.vertex_owner(u, peers)].push(Census { vertex: u });
        sends[hasher.vertex_owner(v, peers)].push(Census { vertex: v });
    }
    let received = fabric.exchange(CHANNEL_CENSUS, sends)?;

    let mut degrees: HashMap<u64, u64> = HashMap::new();
    for census in received.into_iter().flatten() {
        state.vertices.row(census.vertex)?;
        *degrees.entry(census.vertex).or_insert(0) += 1;
    }
    let mut outcome = CensusOutcome::default();
    for (_, degree) in degrees {
        outcome.local_degree_sum += degree;
        outcome.local_max_degree = outcome.local_max_degree.max(degree);
    }
    Ok(outcome)
}

/// Draws this phase's participants among the active edges.
///
/// The draw is a pure function of `(eid, phase)`, so every worker can
/// reproduce any other worker's decisions.
pub fn participation(
    state: &StateStore,
    hasher: &KeyedHasher,
    phase: u64,
    sample_cut: u64,
) -> Vec<usize> {
    state
        .edges
        .active_indices()
        .into_iter()
        .filter(|&index| hasher.sample(state.edges.eid(index), phase) < sample_cut)
        .collect()
}

/// Computes `deg_in_sparse` for every participant and registers the phase
/// incidence at vertex owners.
///
/// `deg_in_sparse(e) = (deg_participating(u) - 1) + (deg_participating(v) - 1)`,
/// assembled from one contribution per endpoint.
pub fn sparse_degrees<F: Fabric>(
    fabric: &mut F,
    hasher: &KeyedHasher,
    state: &mut StateStore,
    participants: &[usize],
) -> Result<(), EngineError> {
    let peers = fabric.peers();

    // edges -> vertices: register both endpoints of each participant
    let mut sends: Vec<Vec<Participate>> = (0..peers).map(|_| Vec::new()).collect();
    for &index in participants {
        let (u, v) = state.edges.endpoints(index);
        let eid = state.edges.eid(index);
        sends[hasher.vertex_owner(u, peers)].push(Participate { vertex: u, eid, u, v });
        sends[hasher.vertex_owner(v, peers)].push(Participate { vertex: v, eid, u, v });
    }
    let received = fabric.exchange(CHANNEL_PARTICIPATE, sends)?;

    state.vertices.begin_phase();
    for registration in received.into_iter().flatten() {
        state.vertices.register(
            registration.vertex,
            IncidentEdge {
                eid: registration.eid,
                u: registration.u,
                v: registration.v,
            },
        )?;
    }

    // vertices -> edges: one (count - 1) contribution per registration
    let mut replies: Vec<Vec<SparseDegree>> = (0..peers).map(|_| Vec::new()).collect();
    for (_, incident) in state.vertices.incidence_iter() {
        let count = incident.len() as u64;
        for edge in incident {
            replies[hasher.edge_owner(edge.eid, peers)].push(SparseDegree {
                eid: edge.eid,
                count: count - 1,
            });
        }
    }
    let received = fabric.exchange(CHANNEL_DEGREE, replies)?;

    for contribution in received.into_iter().flatten() {
        if let Some(index) = state.edges.lookup_active(contribution.eid) {
            state.edges.add_deg_in_sparse(index, contribution.count);
        }
    }
    Ok(())
}
