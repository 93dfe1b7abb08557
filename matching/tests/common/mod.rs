//! Shared harness for the end-to-end suites: spawns workers, feeds each a
//! stripe of the edge list, and collects rank 0's gathered matching.

use std::collections::HashSet;

use matching::config::{SamplingMode, StallMode};
use matching::{gather_matching, run, Config, KeyedHasher, MatchedEdge, RunMetrics};
use matching_communication::{initialize, Configuration, Fabric};

/// Runs the engine over `pairs` on `workers` workers and returns the full
/// matching plus rank 0's metrics.
pub fn run_graph(
    pairs: &[(u64, u64)],
    n: u64,
    workers: usize,
    config: Config,
) -> (Vec<MatchedEdge>, RunMetrics) {
    let pairs = pairs.to_vec();
    let configuration = if workers > 1 {
        Configuration::Process(workers)
    } else {
        Configuration::Thread
    };
    let guards = initialize(configuration, move |mut fabric| {
        // stripe the input round-robin so ingestion routing gets exercised
        let mine: Vec<(u64, u64)> = pairs
            .iter()
            .copied()
            .skip(fabric.index())
            .step_by(fabric.peers())
            .collect();
        let outcome = run(&mut fabric, &config, mine, n).expect("engine run failed");
        assert!(outcome.complete, "run left active edges behind");
        let full = gather_matching(&mut fabric, &outcome.matching).expect("gather failed");
        (full, outcome.metrics)
    })
    .expect("initialize failed");

    let mut rank0 = None;
    for (index, result) in guards.join().into_iter().enumerate() {
        let result = result.expect("worker panicked");
        if index == 0 {
            rank0 = Some(result);
        }
    }
    rank0.expect("rank 0 result")
}

/// A configuration that pins every edge into the phase: full participation,
/// no stalling, fixed radius, and no early hand-off to the finisher.
pub fn pinned_config() -> Config {
    let mut config = Config::default();
    config.sampling.mode = SamplingMode::Fixed;
    config.sampling.p = 1.0;
    config.stall.mode = StallMode::HardThreshold;
    config.stall.t_base = u64::MAX;
    config.r_rounds = Some(2);
    config.finish.small_threshold_factor = 0.0;
    config.test_mode = true;
    config
}

/// No two matched edges may share a vertex.
pub fn assert_valid(matching: &[MatchedEdge]) {
    let mut touched = HashSet::new();
    for edge in matching {
        assert!(touched.insert(edge.u), "vertex {} matched twice", edge.u);
        assert!(touched.insert(edge.v), "vertex {} matched twice", edge.v);
    }
}

/// Every input edge must see at least one matched endpoint.
pub fn assert_maximal(pairs: &[(u64, u64)], matching: &[MatchedEdge]) {
    let touched: HashSet<u64> = matching
        .iter()
        .flat_map(|edge| [edge.u, edge.v])
        .collect();
    for &(u, v) in pairs {
        if u == v {
            continue;
        }
        assert!(
            touched.contains(&u) || touched.contains(&v),
            "edge ({}, {}) unmatched on both ends",
            u,
            v
        );
    }
}

/// The sequential greedy matching in (priority, eid) order, which a single
/// pinned worker must reproduce exactly.
pub fn reference_greedy(pairs: &[(u64, u64)], seed: u64, phase: u64) -> Vec<MatchedEdge> {
    let hasher = KeyedHasher::new(seed);
    let mut edges: Vec<MatchedEdge> = pairs
        .iter()
        .map(|&(u, v)| MatchedEdge {
            u,
            v,
            eid: hasher.edge_id(u, v),
        })
        .collect();
    edges.sort_by_key(|edge| (hasher.priority(edge.eid, phase), edge.eid));
    let mut taken = HashSet::new();
    let mut matching = Vec::new();
    for edge in edges {
        if !taken.contains(&edge.u) && !taken.contains(&edge.v) {
            taken.insert(edge.u);
            taken.insert(edge.v);
            matching.push(edge);
        }
    }
    matching.sort();
    matching
}
