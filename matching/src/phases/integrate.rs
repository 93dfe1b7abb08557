//! Integration: vertex-owner arbitration of tentative choices, match
//! confirmation, global dissemination of newly matched vertices, and
//! deletion of their incident edges.

use std::collections::HashMap;

use matching_communication::Fabric;

use crate::error::EngineError;
use crate::hashing::KeyedHasher;
use crate::protocol::{
    CheckMatch, CheckReply, Claim, Confirm, Verdict, CHANNEL_CHECK, CHANNEL_CHECK_REPLY,
    CHANNEL_CLAIM, CHANNEL_CONFIRM, CHANNEL_VERDICT,
};
use crate::state::StateStore;

/// The globally visible result of integrating one batch.
#[derive(Clone, Debug, Default)]
pub struct IntegrateOutcome {
    /// Matches confirmed on this worker.
    pub confirmed: u64,
    /// The globally reduced set of newly matched vertices, sorted.
    pub newly_matched: Vec<u64>,
    /// Edges this worker deleted for touching a newly matched vertex.
    pub deleted: u64,
}

/// Arbitrates the batch's tentative choices into confirmed matches.
///
/// A choice stands only if it wins the lowest (priority, eid) among the
/// claims at *both* endpoints; everything else quietly stays active. The
/// winners' vertices are then reduced globally so every edge owner can
/// delete the edges they extinguish.
pub fn integrate<F: Fabric>(
    fabric: &mut F,
    hasher: &KeyedHasher,
    state: &mut StateStore,
    chosen: &[usize],
    phase: u64,
    check_stride: usize,
) -> Result<IntegrateOutcome, EngineError> {
    let peers = fabric.peers();

    // tentative choices claim both endpoints
    let mut claims: Vec<Vec<Claim>> = (0..peers).map(|_| Vec::new()).collect();
    for &index in chosen {
        let (u, v) = state.edges.endpoints(index);
        let eid = state.edges.eid(index);
        claims[hasher.vertex_owner(u, peers)].push(Claim { vertex: u, eid });
        claims[hasher.vertex_owner(v, peers)].push(Claim { vertex: v, eid });
    }
    let received = fabric.exchange(CHANNEL_CLAIM, claims)?;

    // vertex owners grant at most one claim per vertex
    let mut by_vertex: HashMap<u64, Vec<u64>> = HashMap::new();
    for claim in received.into_iter().flatten() {
        state.vertices.row(claim.vertex)?;
        by_vertex.entry(claim.vertex).or_default().push(claim.eid);
    }
    let mut verdicts: Vec<Vec<Verdict>> = (0..peers).map(|_| Vec::new()).collect();
    for (vertex, eids) in by_vertex {
        let row = state.vertices.row(vertex)?;
        let winner = if state.vertices.is_matched(row) {
            None
        } else {
            eids.iter()
                .copied()
                .min_by_key(|&eid| (hasher.priority(eid, phase), eid))
        };
        for eid in eids {
            verdicts[hasher.edge_owner(eid, peers)].push(Verdict {
                eid,
                granted: winner == Some(eid),
            });
        }
    }
    let received = fabric.exchange(CHANNEL_VERDICT, verdicts)?;

    // a match stands only when both endpoints granted it
    let mut grants: HashMap<u64, u32> = HashMap::new();
    for verdict in received.into_iter().flatten() {
        if verdict.granted {
            *grants.entry(verdict.eid).or_insert(0) += 1;
        }
    }
    let mut outcome = IntegrateOutcome::default();
    let mut confirms: Vec<Vec<Confirm>> = (0..peers).map(|_| Vec::new()).collect();
    let mut confirmed_edges: Vec<usize> = Vec::new();
    for &index in chosen {
        let eid = state.edges.eid(index);
        if grants.get(&eid).copied().unwrap_or(0) == 2 {
            let (u, v) = state.edges.endpoints(index);
            state.edges.record_match(index);
            outcome.confirmed += 1;
            confirmed_edges.push(index);
            confirms[hasher.vertex_owner(u, peers)].push(Confirm { vertex: u, eid });
            confirms[hasher.vertex_owner(v, peers)].push(Confirm { vertex: v, eid });
        }
    }
    let received = fabric.exchange(CHANNEL_CONFIRM, confirms)?;

    let mut locally_matched = Vec::new();
    for confirm in received.into_iter().flatten() {
        state.vertices.confirm_match(confirm.vertex, confirm.eid)?;
        locally_matched.push(confirm.vertex);
    }

    // disseminate the matched set and extinguish incident edges
    outcome.newly_matched = fabric.allreduce_union(locally_matched)?;
    for index in state.edges.active_indices() {
        let (u, v) = state.edges.endpoints(index);
        if outcome.newly_matched.binary_search(&u).is_ok()
            || outcome.newly_matched.binary_search(&v).is_ok()
        {
            state.edges.deactivate(index);
            outcome.deleted += 1;
        }
    }
    state.vertices.prune_matched(&outcome.newly_matched);

    // sampled round-trip validity check of the new matches
    let stride = check_stride.max(1);
    let mut checks: Vec<Vec<CheckMatch>> = (0..peers).map(|_| Vec::new()).collect();
    for &index in confirmed_edges.iter().step_by(stride) {
        let (u, v) = state.edges.endpoints(index);
        let eid = state.edges.eid(index);
        checks[hasher.vertex_owner(u, peers)].push(CheckMatch { vertex: u, eid });
        checks[hasher.vertex_owner(v, peers)].push(CheckMatch { vertex: v, eid });
    }
    let received = fabric.exchange(CHANNEL_CHECK, checks)?;
    let mut replies: Vec<Vec<CheckReply>> = (0..peers).map(|_| Vec::new()).collect();
    for check in received.into_iter().flatten() {
        let row = state.vertices.row(check.vertex)?;
        replies[hasher.edge_owner(check.eid, peers)].push(CheckReply {
            eid: check.eid,
            ok: state.vertices.matched_by(row) == Some(check.eid),
        });
    }
    let received = fabric.exchange(CHANNEL_CHECK_REPLY, replies)?;
    for reply in received.into_iter().flatten() {
        if !reply.ok {
            return Err(EngineError::InvariantViolation(format!(
                "matched edge {:#x} lost an endpoint", reply.eid
            )));
        }
    }

    Ok(outcome)
}
