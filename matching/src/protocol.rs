//! Typed records exchanged between workers, and the channels they travel on.
//!
//! Records carry global identifiers only; local array positions never cross
//! a worker boundary. Every record type derives `Abomonation` so the fabric
//! can account for its bytes and a serializing transport could carry it.

use abomonation_derive::Abomonation;
use matching_communication::fabric::RESERVED_CHANNELS;

/// Edge routing during ingestion: an edge on its way to its owner.
#[derive(Abomonation, Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdgeRecord {
    /// One endpoint.
    pub u: u64,
    /// The other endpoint.
    pub v: u64,
    /// The symmetric global identifier.
    pub eid: u64,
}

/// Vertex resolution at init: an edge announcing an endpoint to its owner.
#[derive(Abomonation, Clone, Copy, Debug)]
pub struct Announce {
    /// The announced vertex.
    pub vertex: u64,
}

/// Degree census: one incidence of an active edge at a vertex.
#[derive(Abomonation, Clone, Copy, Debug)]
pub struct Census {
    /// The counted vertex.
    pub vertex: u64,
}

/// A participating edge registering an endpoint for this phase.
#[derive(Abomonation, Clone, Copy, Debug)]
pub struct Participate {
    /// The registered vertex.
    pub vertex: u64,
    /// The participating edge.
    pub eid: u64,
    /// One endpoint of that edge.
    pub u: u64,
    /// The other endpoint.
    pub v: u64,
}

/// A vertex owner's sparse-degree contribution back to an edge owner.
#[derive(Abomonation, Clone, Copy, Debug)]
pub struct SparseDegree {
    /// The edge the contribution is for.
    pub eid: u64,
    /// `deg_participating(endpoint) - 1` at one endpoint.
    pub count: u64,
}

/// A stalled edge withdrawing an endpoint registration for this phase.
#[derive(Abomonation, Clone, Copy, Debug)]
pub struct Retract {
    /// The vertex to withdraw from.
    pub vertex: u64,
    /// The stalled edge.
    pub eid: u64,
}

/// A ball-growth request: expand `target`'s ball at `vertex`.
#[derive(Abomonation, Clone, Copy, Debug)]
pub struct Probe {
    /// The vertex whose incident participants are requested.
    pub vertex: u64,
    /// The candidate edge growing its ball.
    pub target: u64,
}

/// A ball-growth reply: one participant incident to a probed vertex.
#[derive(Abomonation, Clone, Copy, Debug)]
pub struct Grow {
    /// The candidate edge growing its ball.
    pub target: u64,
    /// The discovered edge.
    pub eid: u64,
    /// One endpoint of the discovered edge.
    pub u: u64,
    /// The other endpoint.
    pub v: u64,
}

/// A locally chosen edge claiming an endpoint.
#[derive(Abomonation, Clone, Copy, Debug)]
pub struct Claim {
    /// The claimed vertex.
    pub vertex: u64,
    /// The claiming edge.
    pub eid: u64,
}

/// A vertex owner's ruling on one claim.
#[derive(Abomonation, Clone, Copy, Debug)]
pub struct Verdict {
    /// The judged edge.
    pub eid: u64,
    /// Whether the claim won its vertex.
    pub granted: bool,
}

/// A confirmed match taking possession of an endpoint.
#[derive(Abomonation, Clone, Copy, Debug)]
pub struct Confirm {
    /// The matched vertex.
    pub vertex: u64,
    /// The matching edge.
    pub eid: u64,
}

/// A sampled validity probe: `vertex` should be matched by `eid`.
#[derive(Abomonation, Clone, Copy, Debug)]
pub struct CheckMatch {
    /// The probed vertex.
    pub vertex: u64,
    /// The expected matching edge.
    pub eid: u64,
}

/// The vertex owner's answer to a validity probe.
#[derive(Abomonation, Clone, Copy, Debug)]
pub struct CheckReply {
    /// The probed edge.
    pub eid: u64,
    /// Whether the recorded match agreed.
    pub ok: bool,
}

/// A maximality probe: is `vertex` matched at all?
#[derive(Abomonation, Clone, Copy, Debug)]
pub struct QueryMatched {
    /// The probed vertex.
    pub vertex: u64,
    /// The asking edge.
    pub eid: u64,
}

/// The vertex owner's answer to a maximality probe.
#[derive(Abomonation, Clone, Copy, Debug)]
pub struct MatchedReply {
    /// The asking edge.
    pub eid: u64,
    /// Whether the probed vertex is matched.
    pub matched: bool,
}

/// Channel for edge routing during ingestion.
pub const CHANNEL_INGEST: usize = RESERVED_CHANNELS;
/// Channel for vertex resolution at init.
pub const CHANNEL_ANNOUNCE: usize = RESERVED_CHANNELS + 1;
/// Channel for the per-phase degree census.
pub const CHANNEL_CENSUS: usize = RESERVED_CHANNELS + 2;
/// Channel for participation registration.
pub const CHANNEL_PARTICIPATE: usize = RESERVED_CHANNELS + 3;
/// Channel for sparse-degree contributions.
pub const CHANNEL_DEGREE: usize = RESERVED_CHANNELS + 4;
/// Channel for stall retractions.
pub const CHANNEL_RETRACT: usize = RESERVED_CHANNELS + 5;
/// Channel for ball-growth requests.
pub const CHANNEL_PROBE: usize = RESERVED_CHANNELS + 6;
/// Channel for ball-growth replies.
pub const CHANNEL_GROW: usize = RESERVED_CHANNELS + 7;
/// Channel for matching claims.
pub const CHANNEL_CLAIM: usize = RESERVED_CHANNELS + 8;
/// Channel for claim verdicts.
pub const CHANNEL_VERDICT: usize = RESERVED_CHANNELS + 9;
/// Channel for match confirmations.
pub const CHANNEL_CONFIRM: usize = RESERVED_CHANNELS + 10;
/// Channel for sampled validity probes.
pub const CHANNEL_CHECK: usize = RESERVED_CHANNELS + 11;
/// Channel for validity probe replies.
pub const CHANNEL_CHECK_REPLY: usize = RESERVED_CHANNELS + 12;
/// Channel for maximality probes.
pub const CHANNEL_QUERY_MATCHED: usize = RESERVED_CHANNELS + 13;
/// Channel for maximality probe replies.
pub const CHANNEL_MATCHED_REPLY: usize = RESERVED_CHANNELS + 14;
