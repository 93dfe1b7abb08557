//! Stalling: dense participants sit the phase out.

use matching_communication::Fabric;

use crate::error::EngineError;
use crate::hashing::KeyedHasher;
use crate::protocol::{Retract, CHANNEL_RETRACT};
use crate::state::StateStore;

/// The survivors of the stalling step.
#[derive(Clone, Debug, Default)]
pub struct StallOutcome {
    /// Participants that stayed below the threshold, ascending.
    pub candidates: Vec<usize>,
    /// Participants stalled this phase.
    pub stalled: u64,
}

/// Stalls every participant whose sparse degree exceeds `t_phase` and
/// withdraws its endpoint registrations, so vertex owners stop expanding
/// through it.
pub fn apply<F: Fabric>(
    fabric: &mut F,
    hasher: &KeyedHasher,
    state: &mut StateStore,
    participants: &[usize],
    t_phase: u64,
) -> Result<StallOutcome, EngineError> {
    let peers = fabric.peers();
    let mut outcome = StallOutcome::default();
    let mut sends: Vec<Vec<Retract>> = (0..peers).map(|_| Vec::new()).collect();
    for &index in participants {
        if state.edges.deg_in_sparse(index) > t_phase {
            state.edges.set_stalled(index);
            outcome.stalled += 1;
            let (u, v) = state.edges.endpoints(index);
            let eid = state.edges.eid(index);
            sends[hasher.vertex_owner(u, peers)].push(Retract { vertex: u, eid });
            sends[hasher.vertex_owner(v, peers)].push(Retract { vertex: v, eid });
        } else {
            outcome.candidates.push(index);
        }
    }
    let received = fabric.exchange(CHANNEL_RETRACT, sends)?;
    for retract in received.into_iter().flatten() {
        state.vertices.retract(retract.vertex, retract.eid)?;
    }
    Ok(outcome)
}
