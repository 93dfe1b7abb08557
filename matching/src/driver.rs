//! The phase driver: sequences the pipeline, consults the oracle, runs the
//! memory guard between steps, and decides termination.

use log::{error, info, warn};
use matching_communication::Fabric;

use crate::config::{Config, FinishStrategy};
use crate::error::EngineError;
use crate::hashing::KeyedHasher;
use crate::memory::MemoryGuard;
use crate::metrics::{PhaseMetrics, RunMetrics};
use crate::params::ParameterOracle;
use crate::phases::{exponentiate, finish, integrate, local_mis, sparsify, stall};
use crate::protocol::{
    EdgeRecord, MatchedReply, QueryMatched, CHANNEL_MATCHED_REPLY, CHANNEL_QUERY_MATCHED,
};
use crate::state::{distribute, MatchedEdge, StateStore};

/// Sampled-check stride outside test mode.
const CHECK_STRIDE: usize = 8;

/// What one worker hands back at the end of a run.
#[derive(Clone, Debug)]
pub struct Outcome {
    /// Matches owned by this worker.
    pub matching: Vec<MatchedEdge>,
    /// The global matching size.
    pub global_size: u64,
    /// Whether every edge was extinguished; false means the phase budget
    /// ran out with active edges remaining.
    pub complete: bool,
    /// Per-phase and run-level measurements.
    pub metrics: RunMetrics,
}

/// Runs the engine over this worker's slice of the edge list.
///
/// `pairs` may be any subset of the input; ingestion routing moves each
/// edge to its owner first. All workers must call with the same
/// configuration and `n_global`. On a fatal error the failing worker trips
/// the coordinated abort so its lockstep peers unblock and fail too.
pub fn run<F: Fabric>(
    fabric: &mut F,
    config: &Config,
    pairs: Vec<(u64, u64)>,
    n_global: u64,
) -> Result<Outcome, EngineError> {
    match execute(fabric, config, pairs, n_global) {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            error!("worker {}: {} ({})", fabric.index(), err, err.tag());
            fabric.abort(err.tag().to_owned());
            Err(err)
        }
    }
}

fn execute<F: Fabric>(
    fabric: &mut F,
    config: &Config,
    pairs: Vec<(u64, u64)>,
    n_global: u64,
) -> Result<Outcome, EngineError> {
    let hasher = KeyedHasher::new(config.seed);
    let capacity = config.capacity(n_global);
    let check_stride = if config.test_mode { 1 } else { CHECK_STRIDE };

    let records = distribute(fabric, &hasher, pairs)?;
    let originals = if config.test_mode {
        records.clone()
    } else {
        Vec::new()
    };
    let mut state = StateStore::init(fabric, &hasher, records)?;
    let mut oracle = ParameterOracle::new(config, capacity, fabric.peers());
    let mut guard = MemoryGuard::new(&config.memory);
    let mut metrics = RunMetrics {
        edges_dropped: fabric.allreduce_sum(state.edges.dropped())?,
        ..RunMetrics::default()
    };

    if fabric.index() == 0 {
        info!(
            "starting: n = {}, budget S = {}, {} workers",
            n_global,
            capacity,
            fabric.peers()
        );
    }

    let mut complete = false;
    let mut phase: u64 = 0;
    loop {
        let global_active = fabric.allreduce_sum(state.edges.active_count() as u64)?;
        if global_active == 0 {
            complete = true;
            break;
        }
        if phase as usize >= config.phase_budget {
            break;
        }
        if global_active <= oracle.small_threshold() {
            let strategy = permitted_strategy(config, global_active, capacity);
            let confirmed =
                finish::finish(fabric, &hasher, &mut state, strategy, phase, check_stride)?;
            metrics.finish_matches = fabric.allreduce_sum(confirmed)?;
            complete = true;
            break;
        }

        // refresh the degree estimate and check edge-count consistency
        let census = sparsify::census(fabric, &hasher, &state)?;
        let delta_est = fabric.allreduce_max(census.local_max_degree)?;
        let degree_sum = fabric.allreduce_sum(census.local_degree_sum)?;
        if degree_sum != 2 * global_active {
            return Err(EngineError::InvariantViolation(format!(
                "degree sum {} against {} active edges",
                degree_sum, global_active
            )));
        }

        let params = oracle.phase_params(global_active, delta_est);
        let comm_before = fabric.counters().snapshot();

        state.edges.begin_phase(&hasher, phase);
        let participants = sparsify::participation(&state, &hasher, phase, params.sample_cut);
        sparsify::sparse_degrees(fabric, &hasher, &mut state, &participants)?;
        guard.check(&mut state)?;

        let stalled = stall::apply(fabric, &hasher, &mut state, &participants, params.t_phase)?;
        guard.check(&mut state)?;

        // candidates run in lockstep batches; workers with fewer batches
        // participate with empty ones
        let candidates = stalled.candidates;
        let local_batches = candidates.len().div_ceil(params.batch_size);
        let batches = fabric.allreduce_max(local_batches as u64)?;

        let mut ball_max = 0u64;
        let mut ball_entries = 0u64;
        let mut ball_slots = 0u64;
        let mut overflows = 0u64;
        let mut examined = 0u64;
        let mut chosen_count = 0u64;
        let mut confirmed = 0u64;
        for batch_index in 0..batches {
            let lo = (batch_index as usize * params.batch_size).min(candidates.len());
            let hi = (lo + params.batch_size).min(candidates.len());
            let batch = &candidates[lo..hi];

            let (arena, stats) = exponentiate::build_balls(
                fabric,
                &hasher,
                &mut state,
                batch,
                params.r_rounds,
                capacity,
                config.overflow,
            )?;
            oracle.observe_ball_max(stats.max);
            ball_max = ball_max.max(stats.max);
            ball_entries += stats.entries;
            ball_slots += stats.slots;
            overflows += stats.overflows;
            guard.check(&mut state)?;

            let selection = local_mis::greedy(&state.edges, &arena, batch);
            examined += selection.candidates;
            chosen_count += selection.chosen.len() as u64;

            let integrated = integrate::integrate(
                fabric,
                &hasher,
                &mut state,
                &selection.chosen,
                phase,
                check_stride,
            )?;
            confirmed += integrated.confirmed;
            drop(arena);
            guard.check(&mut state)?;
        }

        // reduce the phase's figures for the metrics record
        let participants_global = fabric.allreduce_sum(participants.len() as u64)?;
        let stalled_global = fabric.allreduce_sum(stalled.stalled)?;
        let examined_global = fabric.allreduce_sum(examined)?;
        let chosen_global = fabric.allreduce_sum(chosen_count)?;
        let confirmed_global = fabric.allreduce_sum(confirmed)?;
        let ball_max_global = fabric.allreduce_max(ball_max)?;
        let entries_global = fabric.allreduce_sum(ball_entries)?;
        let slots_global = fabric.allreduce_sum(ball_slots)?;
        let overflows_global = fabric.allreduce_sum(overflows)?;
        let comm = fabric.counters().since(&comm_before);

        let record = PhaseMetrics {
            phase: phase as usize,
            active_edges: global_active,
            delta_est,
            p_phase: params.p_phase,
            participation_rate: ratio(participants_global, global_active),
            stalling_rate: ratio(stalled_global, participants_global),
            ball_max: ball_max_global,
            ball_mean: if slots_global == 0 {
                0.0
            } else {
                entries_global as f64 / slots_global as f64
            },
            ball_overflows: overflows_global,
            mis_selection_rate: ratio(chosen_global, examined_global),
            matched_edges: confirmed_global,
            comm_bytes: comm.bytes_sent + comm.bytes_received,
            comm_blocked: comm.blocked(),
        };
        if fabric.index() == 0 {
            record.log();
        }
        metrics.phases.push(record);

        state.compact_if_needed(config.compact_threshold);
        phase += 1;
    }

    if !complete {
        // budget exhausted; the finisher may still be allowed to clean up
        let global_active = fabric.allreduce_sum(state.edges.active_count() as u64)?;
        let gather_blocked = config.finish.strategy == FinishStrategy::Gather
            && global_active > capacity;
        if global_active > 0 && !gather_blocked {
            let confirmed = finish::finish(
                fabric,
                &hasher,
                &mut state,
                config.finish.strategy,
                phase,
                check_stride,
            )?;
            metrics.finish_matches = fabric.allreduce_sum(confirmed)?;
            complete = true;
        } else if global_active > 0 {
            warn!(
                "progress stalled: {} active edges after {} phases",
                global_active, phase
            );
        }
    }

    metrics.total_phases = metrics.phases.len();
    metrics.max_message_bytes = fabric.counters().max_message_bytes;
    metrics.peak_rss_bytes = guard.peak_rss;
    metrics.complete = complete;
    let global_size = fabric.allreduce_sum(state.edges.matched().len() as u64)?;
    metrics.matching_size = global_size;

    if complete && config.test_mode {
        verify_maximal(fabric, &hasher, &state, &originals)?;
    }

    Ok(Outcome {
        matching: state.edges.matched().to_vec(),
        global_size,
        complete,
        metrics,
    })
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Gather finishing is only permitted when the residual fits in one
/// machine's budget; otherwise fall back to the distributed strategy.
fn permitted_strategy(config: &Config, global_active: u64, capacity: u64) -> FinishStrategy {
    match config.finish.strategy {
        FinishStrategy::Gather if global_active > capacity => {
            info!(
                "residual {} exceeds budget {}, finishing distributed",
                global_active, capacity
            );
            FinishStrategy::Distributed
        }
        strategy => strategy,
    }
}

/// Full maximality audit: every input edge must see a matched endpoint.
/// Expensive, so only run in test mode on complete runs.
fn verify_maximal<F: Fabric>(
    fabric: &mut F,
    hasher: &KeyedHasher,
    state: &StateStore,
    originals: &[EdgeRecord],
) -> Result<(), EngineError> {
    let peers = fabric.peers();
    let mut queries: Vec<Vec<QueryMatched>> = (0..peers).map(|_| Vec::new()).collect();
    for record in originals {
        if record.u == record.v {
            continue;
        }
        queries[hasher.vertex_owner(record.u, peers)].push(QueryMatched {
            vertex: record.u,
            eid: record.eid,
        });
        queries[hasher.vertex_owner(record.v, peers)].push(QueryMatched {
            vertex: record.v,
            eid: record.eid,
        });
    }
    let received = fabric.exchange(CHANNEL_QUERY_MATCHED, queries)?;

    let mut replies: Vec<Vec<MatchedReply>> = (0..peers).map(|_| Vec::new()).collect();
    for query in received.into_iter().flatten() {
        let row = state.vertices.row(query.vertex)?;
        replies[hasher.edge_owner(query.eid, peers)].push(MatchedReply {
            eid: query.eid,
            matched: state.vertices.is_matched(row),
        });
    }
    let received = fabric.exchange(CHANNEL_MATCHED_REPLY, replies)?;

    let mut saturated: std::collections::HashMap<u64, bool> = std::collections::HashMap::new();
    for reply in received.into_iter().flatten() {
        *saturated.entry(reply.eid).or_insert(false) |= reply.matched;
    }
    for (eid, matched) in saturated {
        if !matched {
            return Err(EngineError::InvariantViolation(format!(
                "edge {:#x} has no matched endpoint at termination",
                eid
            )));
        }
    }
    Ok(())
}

/// Collects the complete matching at rank 0, sorted by endpoints.
///
/// Non-root workers receive an empty list.
pub fn gather_matching<F: Fabric>(
    fabric: &mut F,
    matching: &[MatchedEdge],
) -> Result<Vec<MatchedEdge>, EngineError> {
    let mut words = Vec::with_capacity(matching.len() * 3);
    for edge in matching {
        words.extend_from_slice(&[edge.u, edge.v, edge.eid]);
    }
    let gathered = fabric.gather(0, words)?;
    let mut all: Vec<MatchedEdge> = gathered
        .chunks_exact(3)
        .map(|triple| MatchedEdge {
            u: triple[0],
            v: triple[1],
            eid: triple[2],
        })
        .collect();
    all.sort();
    Ok(all)
}
