//! Greedy independent-set selection on each worker's balls.
//!
//! No communication: priorities are deterministic, the walk order is
//! (priority, eid) ascending, and a candidate yields as soon as a
//! previously chosen edge appears in its ball on a shared vertex. Choices
//! are tentative; the integrator arbitrates conflicts between workers.

use crate::state::{BallArena, EdgeStore};

/// The local selection for one batch.
#[derive(Clone, Debug, Default)]
pub struct MisOutcome {
    /// Chosen edge positions.
    pub chosen: Vec<usize>,
    /// Candidates examined.
    pub candidates: u64,
}

/// Walks the batch in priority order and chooses every candidate without a
/// conflicting earlier choice.
pub fn greedy(edges: &EdgeStore, arena: &BallArena, batch: &[usize]) -> MisOutcome {
    let mut order: Vec<(usize, usize)> = batch
        .iter()
        .copied()
        .enumerate()
        .filter(|&(_, index)| edges.is_active(index) && !edges.is_stalled(index))
        .collect();
    order.sort_by_key(|&(_, index)| (edges.priority(index), edges.eid(index)));

    let mut outcome = MisOutcome {
        chosen: Vec::new(),
        candidates: order.len() as u64,
    };
    // (eid, u, v) of each choice so far
    let mut chosen: Vec<(u64, u64, u64)> = Vec::new();

    for (slot, index) in order {
        let (u, v) = edges.endpoints(index);
        let conflicted = chosen.iter().any(|&(eid, cu, cv)| {
            let shares = cu == u || cu == v || cv == u || cv == v;
            shares && arena.contains(slot, eid)
        });
        if !conflicted {
            chosen.push((edges.eid(index), u, v));
            outcome.chosen.push(index);
        }
    }
    outcome
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hashing::KeyedHasher;
    use crate::protocol::EdgeRecord;
    use crate::state::{BallArena, EdgeStore};

    /// Balls of radius one over a triangle: every edge sees both others.
    #[test]
    fn triangle_keeps_only_the_best() {
        let hasher = KeyedHasher::new(42);
        let pairs = [(1u64, 2u64), (2, 3), (1, 3)];
        let records: Vec<EdgeRecord> = pairs
            .iter()
            .map(|&(u, v)| EdgeRecord { u, v, eid: hasher.edge_id(u, v) })
            .collect();
        let mut edges = EdgeStore::from_records(records);
        edges.begin_phase(&hasher, 0);

        let all: Vec<u64> = {
            let mut eids: Vec<u64> = (0..3).map(|index| edges.eid(index)).collect();
            eids.sort_unstable();
            eids
        };
        let arena = BallArena::seal(vec![all.clone(), all.clone(), all]);
        let batch = vec![0, 1, 2];
        let outcome = greedy(&edges, &arena, &batch);

        assert_eq!(outcome.candidates, 3);
        assert_eq!(outcome.chosen.len(), 1);
        let winner = outcome.chosen[0];
        for index in 0..3 {
            assert!(
                (edges.priority(winner), edges.eid(winner))
                    <= (edges.priority(index), edges.eid(index))
            );
        }
    }

    /// Distance-two ball entries must not suppress vertex-disjoint choices.
    #[test]
    fn disjoint_edges_coexist_despite_shared_balls() {
        let hasher = KeyedHasher::new(42);
        let pairs = [(1u64, 2u64), (3, 4)];
        let records: Vec<EdgeRecord> = pairs
            .iter()
            .map(|&(u, v)| EdgeRecord { u, v, eid: hasher.edge_id(u, v) })
            .collect();
        let mut edges = EdgeStore::from_records(records);
        edges.begin_phase(&hasher, 0);

        let mut all: Vec<u64> = (0..2).map(|index| edges.eid(index)).collect();
        all.sort_unstable();
        let arena = BallArena::seal(vec![all.clone(), all]);
        let outcome = greedy(&edges, &arena, &[0, 1]);
        assert_eq!(outcome.chosen.len(), 2);
    }

    #[test]
    fn stalled_and_dead_candidates_are_skipped() {
        let hasher = KeyedHasher::new(42);
        let pairs = [(1u64, 2u64), (3, 4), (5, 6)];
        let records: Vec<EdgeRecord> = pairs
            .iter()
            .map(|&(u, v)| EdgeRecord { u, v, eid: hasher.edge_id(u, v) })
            .collect();
        let mut edges = EdgeStore::from_records(records);
        edges.begin_phase(&hasher, 0);
        edges.set_stalled(0);
        edges.deactivate(1);

        let arena = BallArena::seal(vec![Vec::new(), Vec::new(), vec![edges.eid(2)]]);
        let outcome = greedy(&edges, &arena, &[0, 1, 2]);
        assert_eq!(outcome.candidates, 1);
        assert_eq!(outcome.chosen, vec![2]);
    }
}
