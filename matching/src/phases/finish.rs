//! Finishing the small residual: gather-to-zero sequential greedy, or
//! distributed arbitration rounds, behind a policy flag.

use std::collections::HashSet;

use matching_communication::Fabric;

use crate::config::FinishStrategy;
use crate::error::EngineError;
use crate::hashing::KeyedHasher;
use crate::phases::integrate;
use crate::state::StateStore;

/// Backstop on distributed finishing rounds; each round matches at least
/// the globally best remaining edge, so reaching this means no progress.
const ROUND_CAP: u64 = 1024;

/// Matches everything left in the residual graph.
///
/// Returns the number of matches confirmed on this worker. A terminal
/// state (no active edges anywhere) is a no-op for either strategy.
pub fn finish<F: Fabric>(
    fabric: &mut F,
    hasher: &KeyedHasher,
    state: &mut StateStore,
    strategy: FinishStrategy,
    phase_key: u64,
    check_stride: usize,
) -> Result<u64, EngineError> {
    match strategy {
        FinishStrategy::Gather => gather_finish(fabric, hasher, state, phase_key),
        FinishStrategy::Distributed => {
            distributed_finish(fabric, hasher, state, phase_key, check_stride)
        }
    }
}

/// Ships residual edges to rank 0, matches them sequentially in priority
/// order, and broadcasts the winners.
fn gather_finish<F: Fabric>(
    fabric: &mut F,
    hasher: &KeyedHasher,
    state: &mut StateStore,
    phase_key: u64,
) -> Result<u64, EngineError> {
    let peers = fabric.peers();

    let mut words = Vec::new();
    for index in state.edges.active_indices() {
        let (u, v) = state.edges.endpoints(index);
        words.extend_from_slice(&[u, v, state.edges.eid(index)]);
    }
    let gathered = fabric.gather(0, words)?;

    let winner_words = if fabric.index() == 0 {
        let mut residual: Vec<(u64, u64, u64)> = gathered
            .chunks_exact(3)
            .map(|triple| (triple[0], triple[1], triple[2]))
            .collect();
        residual.sort_by_key(|&(_, _, eid)| (hasher.priority(eid, phase_key), eid));
        let mut taken: HashSet<u64> = HashSet::new();
        let mut winners = Vec::new();
        for (u, v, eid) in residual {
            if !taken.contains(&u) && !taken.contains(&v) {
                taken.insert(u);
                taken.insert(v);
                winners.extend_from_slice(&[u, v, eid]);
            }
        }
        winners
    } else {
        Vec::new()
    };
    let winners = fabric.broadcast(0, winner_words)?;

    let mut matched_vertices = Vec::with_capacity(winners.len() / 3 * 2);
    let mut confirmed = 0;
    for triple in winners.chunks_exact(3) {
        let (u, v, eid) = (triple[0], triple[1], triple[2]);
        matched_vertices.push(u);
        matched_vertices.push(v);
        if hasher.edge_owner(eid, peers) == fabric.index() {
            let index = state
                .edges
                .lookup_active(eid)
                .ok_or_else(|| {
                    EngineError::InvariantViolation(format!(
                        "finisher winner {:#x} unknown to its owner",
                        eid
                    ))
                })?;
            state.edges.record_match(index);
            confirmed += 1;
        }
        for vertex in [u, v] {
            if hasher.vertex_owner(vertex, peers) == fabric.index() {
                state.vertices.confirm_match(vertex, eid)?;
            }
        }
    }

    matched_vertices.sort_unstable();
    for index in state.edges.active_indices() {
        let (u, v) = state.edges.endpoints(index);
        if matched_vertices.binary_search(&u).is_ok()
            || matched_vertices.binary_search(&v).is_ok()
        {
            state.edges.deactivate(index);
        }
    }
    Ok(confirmed)
}

/// Repeats integration-style arbitration over all residual edges until
/// none remain: every round the globally best edge (and typically many
/// more) wins both endpoints.
fn distributed_finish<F: Fabric>(
    fabric: &mut F,
    hasher: &KeyedHasher,
    state: &mut StateStore,
    phase_key: u64,
    check_stride: usize,
) -> Result<u64, EngineError> {
    let mut confirmed = 0;
    for round in 0..ROUND_CAP {
        let active = fabric.allreduce_sum(state.edges.active_count() as u64)?;
        if active == 0 {
            return Ok(confirmed);
        }
        let key = phase_key + round;
        state.edges.begin_phase(hasher, key);
        let residual = state.edges.active_indices();
        let outcome = integrate::integrate(fabric, hasher, state, &residual, key, check_stride)?;
        confirmed += outcome.confirmed;
    }
    let active = fabric.allreduce_sum(state.edges.active_count() as u64)?;
    Err(EngineError::ProgressStall {
        active,
        phases: ROUND_CAP as usize,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::FinishStrategy;
    use crate::hashing::KeyedHasher;
    use crate::state::{distribute, StateStore};
    use matching_communication::Thread;

    fn state_for(fabric: &mut Thread, hasher: &KeyedHasher, pairs: &[(u64, u64)]) -> StateStore {
        let records = distribute(fabric, hasher, pairs.to_vec()).unwrap();
        StateStore::init(fabric, hasher, records).unwrap()
    }

    fn assert_valid_and_maximal(state: &StateStore, pairs: &[(u64, u64)]) {
        let mut touched = std::collections::HashSet::new();
        for matched in state.edges.matched() {
            assert!(touched.insert(matched.u), "vertex {} matched twice", matched.u);
            assert!(touched.insert(matched.v), "vertex {} matched twice", matched.v);
        }
        for &(u, v) in pairs {
            assert!(
                touched.contains(&u) || touched.contains(&v),
                "edge ({}, {}) left unmatched on both ends",
                u,
                v
            );
        }
    }

    #[test]
    fn gather_matches_the_residual() {
        let hasher = KeyedHasher::new(42);
        let mut fabric = Thread::new();
        let pairs = [(1u64, 2u64), (2, 3), (3, 4), (5, 6)];
        let mut state = state_for(&mut fabric, &hasher, &pairs);
        let confirmed =
            finish(&mut fabric, &hasher, &mut state, FinishStrategy::Gather, 7, 1).unwrap();
        assert!(confirmed >= 2);
        assert_eq!(state.edges.active_count(), 0);
        assert_valid_and_maximal(&state, &pairs);
    }

    #[test]
    fn distributed_matches_the_residual() {
        let hasher = KeyedHasher::new(42);
        let mut fabric = Thread::new();
        let pairs = [(1u64, 2u64), (2, 3), (3, 4), (5, 6)];
        let mut state = state_for(&mut fabric, &hasher, &pairs);
        let confirmed = finish(
            &mut fabric,
            &hasher,
            &mut state,
            FinishStrategy::Distributed,
            7,
            1,
        )
        .unwrap();
        assert!(confirmed >= 2);
        assert_eq!(state.edges.active_count(), 0);
        assert_valid_and_maximal(&state, &pairs);
    }

    #[test]
    fn finishing_a_terminal_state_is_a_no_op() {
        let hasher = KeyedHasher::new(42);
        let mut fabric = Thread::new();
        let pairs = [(1u64, 2u64), (3, 4)];
        let mut state = state_for(&mut fabric, &hasher, &pairs);
        for strategy in [FinishStrategy::Gather, FinishStrategy::Distributed] {
            finish(&mut fabric, &hasher, &mut state, strategy, 7, 1).unwrap();
        }
        let before = state.edges.matched().len();
        for strategy in [FinishStrategy::Gather, FinishStrategy::Distributed] {
            let confirmed = finish(&mut fabric, &hasher, &mut state, strategy, 7, 1).unwrap();
            assert_eq!(confirmed, 0);
        }
        assert_eq!(state.edges.matched().len(), before);
    }
}
