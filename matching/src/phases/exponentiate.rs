//! Ball growth over the implicit sparsified line graph.
//!
//! There is no line graph anywhere: each round asks vertex owners which
//! participating edges touch the vertices on the current frontier, and the
//! answers extend the frontier. Adjacency is computed by joining edges
//! through their shared vertex, on the vertex's owner, on demand.

use std::collections::HashMap;

use log::warn;
use matching_communication::Fabric;

use crate::config::OverflowPolicy;
use crate::error::EngineError;
use crate::hashing::KeyedHasher;
use crate::protocol::{Grow, Probe, CHANNEL_GROW, CHANNEL_PROBE};
use crate::state::{merge_sorted_unique, BallArena, StateStore};

/// Ball statistics for one batch.
#[derive(Clone, Copy, Debug, Default)]
pub struct BallStats {
    /// Largest ball grown in this batch.
    pub max: u64,
    /// Ball entries stored over the batch.
    pub entries: u64,
    /// Candidates that grew a non-empty ball.
    pub slots: u64,
    /// Candidates stalled for outgrowing the budget.
    pub overflows: u64,
}

/// A frontier entry: an edge and its endpoints.
type FrontierEdge = (u64, u64, u64);

/// Grows `B_R(e)` for every candidate in `batch`, in `r_rounds` lockstep
/// rounds of two exchanges each.
///
/// Candidates whose ball would exceed `capacity` are handled per the
/// overflow policy: stalled and dropped from the batch, or surfaced as a
/// fatal error. The sealed arena has one slot per batch position; dropped
/// and inactive candidates own empty slots.
pub fn build_balls<F: Fabric>(
    fabric: &mut F,
    hasher: &KeyedHasher,
    state: &mut StateStore,
    batch: &[usize],
    r_rounds: usize,
    capacity: u64,
    policy: OverflowPolicy,
) -> Result<(BallArena, BallStats), EngineError> {
    let peers = fabric.peers();

    // slot-per-candidate growth state; an edge deactivated by an earlier
    // batch keeps an empty slot to stay aligned
    let mut balls: Vec<Vec<u64>> = vec![Vec::new(); batch.len()];
    let mut frontier: Vec<Vec<FrontierEdge>> = vec![Vec::new(); batch.len()];
    let mut slot_of: HashMap<u64, usize> = HashMap::new();
    for (slot, &index) in batch.iter().enumerate() {
        if !state.edges.is_active(index) || state.edges.is_stalled(index) {
            continue;
        }
        let (u, v) = state.edges.endpoints(index);
        let eid = state.edges.eid(index);
        balls[slot].push(eid);
        frontier[slot].push((eid, u, v));
        slot_of.insert(eid, slot);
    }

    let mut stats = BallStats::default();

    for _round in 0..r_rounds {
        // frontier endpoints -> vertex owners
        let mut probes: Vec<Vec<Probe>> = (0..peers).map(|_| Vec::new()).collect();
        for (slot, &index) in batch.iter().enumerate() {
            let target = state.edges.eid(index);
            if !slot_of.contains_key(&target) {
                continue;
            }
            for &(_, fu, fv) in &frontier[slot] {
                probes[hasher.vertex_owner(fu, peers)].push(Probe { vertex: fu, target });
                probes[hasher.vertex_owner(fv, peers)].push(Probe { vertex: fv, target });
            }
        }
        let received = fabric.exchange(CHANNEL_PROBE, probes)?;

        // vertex owners expand against the phase incidence
        let mut grows: Vec<Vec<Grow>> = (0..peers).map(|_| Vec::new()).collect();
        for probe in received.into_iter().flatten() {
            state.vertices.row(probe.vertex)?;
            let owner = hasher.edge_owner(probe.target, peers);
            for incident in state.vertices.incidence(probe.vertex) {
                grows[owner].push(Grow {
                    target: probe.target,
                    eid: incident.eid,
                    u: incident.u,
                    v: incident.v,
                });
            }
        }
        let received = fabric.exchange(CHANNEL_GROW, grows)?;

        // merge-union replies into balls, keeping the unseen as frontier
        let mut news: Vec<Vec<FrontierEdge>> = vec![Vec::new(); batch.len()];
        for grow in received.into_iter().flatten() {
            if let Some(&slot) = slot_of.get(&grow.target) {
                news[slot].push((grow.eid, grow.u, grow.v));
            }
        }
        for (slot, mut incoming) in news.into_iter().enumerate() {
            if incoming.is_empty() {
                frontier[slot].clear();
                continue;
            }
            incoming.sort_unstable_by_key(|&(eid, _, _)| eid);
            incoming.dedup_by_key(|&mut (eid, _, _)| eid);
            let fresh: Vec<FrontierEdge> = incoming
                .into_iter()
                .filter(|&(eid, _, _)| balls[slot].binary_search(&eid).is_err())
                .collect();
            if fresh.is_empty() {
                frontier[slot].clear();
                continue;
            }
            let fresh_eids: Vec<u64> = fresh.iter().map(|&(eid, _, _)| eid).collect();
            let merged = merge_sorted_unique(&balls[slot], &fresh_eids);
            if merged.len() as u64 > capacity {
                let index = batch[slot];
                let eid = state.edges.eid(index);
                match policy {
                    OverflowPolicy::Stall => {
                        warn!(
                            "ball of edge {:#x} reached {} entries, stalling it",
                            eid,
                            merged.len()
                        );
                        state.edges.set_stalled(index);
                        slot_of.remove(&eid);
                        balls[slot].clear();
                        frontier[slot].clear();
                        stats.overflows += 1;
                    }
                    OverflowPolicy::Abort => {
                        return Err(EngineError::BallOverflow {
                            eid,
                            size: merged.len(),
                            budget: capacity,
                        });
                    }
                }
            } else {
                balls[slot] = merged;
                frontier[slot] = fresh;
            }
        }
    }

    stats.entries = balls.iter().map(|ball| ball.len() as u64).sum();
    stats.slots = balls.iter().filter(|ball| !ball.is_empty()).count() as u64;
    let arena = BallArena::seal(balls);
    stats.max = arena.max_len() as u64;
    Ok((arena, stats))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::OverflowPolicy;
    use crate::hashing::KeyedHasher;
    use crate::phases::sparsify;
    use crate::state::{distribute, StateStore};
    use matching_communication::Thread;

    /// A single-worker state over a path graph with full participation.
    fn path_state(fabric: &mut Thread, hasher: &KeyedHasher, n: u64) -> StateStore {
        let pairs: Vec<(u64, u64)> = (0..n - 1).map(|i| (i, i + 1)).collect();
        let records = distribute(fabric, hasher, pairs).unwrap();
        let mut state = StateStore::init(fabric, hasher, records).unwrap();
        state.edges.begin_phase(hasher, 0);
        let participants = state.edges.active_indices();
        sparsify::sparse_degrees(fabric, hasher, &mut state, &participants).unwrap();
        state
    }

    #[test]
    fn radius_grows_one_hop_per_round() {
        let hasher = KeyedHasher::new(42);
        let mut fabric = Thread::new();
        let mut state = path_state(&mut fabric, &hasher, 8);
        let batch = state.edges.active_indices();
        for (rounds, expect_max) in [(1usize, 3u64), (2, 5), (3, 7)] {
            let (arena, stats) = build_balls(
                &mut fabric,
                &hasher,
                &mut state,
                &batch,
                rounds,
                1_000,
                OverflowPolicy::Stall,
            )
            .unwrap();
            // interior path edges see exactly 2 new edges per hop
            assert_eq!(stats.max, expect_max);
            for slot in 0..arena.len() {
                let ball = arena.ball(slot);
                assert!(ball.windows(2).all(|pair| pair[0] < pair[1]));
                assert!(arena.contains(slot, state.edges.eid(batch[slot])));
            }
        }
    }

    #[test]
    fn overflowing_candidates_stall() {
        let hasher = KeyedHasher::new(42);
        let mut fabric = Thread::new();
        let mut state = path_state(&mut fabric, &hasher, 8);
        let batch = state.edges.active_indices();
        let (arena, stats) = build_balls(
            &mut fabric,
            &hasher,
            &mut state,
            &batch,
            3,
            4,
            OverflowPolicy::Stall,
        )
        .unwrap();
        assert!(stats.overflows > 0);
        assert!(stats.max <= 4);
        for slot in 0..arena.len() {
            if state.edges.is_stalled(batch[slot]) {
                assert!(arena.ball(slot).is_empty());
            }
        }
    }

    #[test]
    fn overflow_can_abort() {
        let hasher = KeyedHasher::new(42);
        let mut fabric = Thread::new();
        let mut state = path_state(&mut fabric, &hasher, 8);
        let batch = state.edges.active_indices();
        let result = build_balls(
            &mut fabric,
            &hasher,
            &mut state,
            &batch,
            3,
            4,
            OverflowPolicy::Abort,
        );
        assert!(matches!(result, Err(EngineError::BallOverflow { .. })));
    }
}
