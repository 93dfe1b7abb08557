//! End-to-end scenarios over small named graphs and one random graph.

mod common;

use common::{assert_maximal, assert_valid, pinned_config, reference_greedy, run_graph};
use matching::Config;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn triangle_single_worker() {
    let pairs = [(1u64, 2u64), (2, 3), (1, 3)];
    let (matching, metrics) = run_graph(&pairs, 4, 1, pinned_config());
    assert_eq!(matching.len(), 1);
    // the survivor is the edge with the lowest phase-0 priority
    assert_eq!(matching, reference_greedy(&pairs, 42, 0));
    assert_eq!(metrics.total_phases, 1);
    assert_valid(&matching);
    assert_maximal(&pairs, &matching);
}

#[test]
fn path_two_workers() {
    let pairs = [(1u64, 2u64), (2, 3), (3, 4)];
    let (matching, _) = run_graph(&pairs, 5, 2, pinned_config());
    let expected = reference_greedy(&pairs, 42, 0);
    assert_eq!(matching, expected);
    assert_valid(&matching);
    assert_maximal(&pairs, &matching);
}

#[test]
fn star_four_workers() {
    let pairs: Vec<(u64, u64)> = (1u64..=5).map(|leaf| (0, leaf)).collect();
    let (matching, _) = run_graph(&pairs, 6, 4, pinned_config());
    assert_eq!(matching.len(), 1);
    assert_eq!(matching, reference_greedy(&pairs, 42, 0));
    assert_maximal(&pairs, &matching);
}

#[test]
fn four_cycle_two_workers() {
    let pairs = [(1u64, 2u64), (2, 3), (3, 4), (4, 1)];
    let (matching, _) = run_graph(&pairs, 5, 2, pinned_config());
    assert_eq!(matching.len(), 2);
    assert_eq!(matching, reference_greedy(&pairs, 42, 0));
    assert_valid(&matching);
    assert_maximal(&pairs, &matching);
}

#[test]
fn disjoint_edges_finish_in_one_phase() {
    let pairs = [(1u64, 2u64), (3, 4)];
    let (matching, metrics) = run_graph(&pairs, 5, 2, pinned_config());
    assert_eq!(matching.len(), 2);
    assert_eq!(metrics.total_phases, 1);
    assert_valid(&matching);
    assert_maximal(&pairs, &matching);
}

#[test]
fn empty_graph_is_a_trivial_run() {
    let (matching, metrics) = run_graph(&[], 0, 2, pinned_config());
    assert!(matching.is_empty());
    assert_eq!(metrics.total_phases, 0);
    assert!(metrics.complete);
}

#[test]
fn mirrored_duplicates_and_self_loops_are_dropped() {
    let pairs = [(1u64, 2u64), (2, 1), (3, 3), (3, 4)];
    let (matching, metrics) = run_graph(&pairs, 5, 2, pinned_config());
    assert_eq!(matching.len(), 2);
    assert_eq!(metrics.edges_dropped, 2);
    assert_valid(&matching);
}

#[test]
fn random_graph_four_workers() {
    let mut rng = StdRng::seed_from_u64(7);
    let n = 1000u64;
    let mut pairs = Vec::new();
    for u in 0..n {
        for v in (u + 1)..n {
            if rng.gen::<f64>() < 0.02 {
                pairs.push((u, v));
            }
        }
    }

    let mut config = Config::default();
    config.test_mode = true;
    let capacity = config.capacity(n);
    let (matching, metrics) = run_graph(&pairs, n, 4, config);

    assert_valid(&matching);
    assert_maximal(&pairs, &matching);
    assert!(matching.len() >= 243, "only {} matches", matching.len());
    for phase in &metrics.phases {
        assert!(
            phase.ball_max <= capacity,
            "phase {} grew a ball of {}",
            phase.phase,
            phase.ball_max
        );
    }
}
