//! Error kinds and their recovery policy.
//!
//! Only ball overflow (handled inside exponentiation) and soft memory
//! pressure (handled by the guard) are recoverable; every other kind is
//! fatal and triggers a coordinated abort, because continuing after a
//! violated invariant would corrupt the matching.

use matching_communication::FabricError;
use thiserror::Error;

/// A failure observed by one worker.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A ball outgrew the per-machine budget under the abort policy.
    #[error("ball of edge {eid:#x} reached {size} entries, budget {budget}")]
    BallOverflow {
        /// The overflowing candidate.
        eid: u64,
        /// Observed ball size.
        size: usize,
        /// The per-machine edge budget S.
        budget: u64,
    },

    /// Resident memory crossed the hard threshold.
    #[error("resident set {rss} bytes over hard limit {limit}")]
    BudgetExceeded {
        /// Observed resident set size.
        rss: u64,
        /// The hard limit in bytes.
        limit: u64,
    },

    /// A cross-component invariant failed.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A sampled identifier check found an asymmetric edge id.
    #[error("edge id of ({u}, {v}) depends on endpoint order")]
    SymmetricIdFailure {
        /// One endpoint.
        u: u64,
        /// The other endpoint.
        v: u64,
    },

    /// The transport failed or a peer requested a coordinated abort.
    #[error(transparent)]
    Fabric(#[from] FabricError),

    /// A message referenced a vertex unknown to its owner.
    #[error("vertex {vertex} unknown to its owner")]
    MalformedGraph {
        /// The unknown vertex.
        vertex: u64,
    },

    /// The phase budget ran out with active edges remaining.
    #[error("{active} active edges after {phases} phases")]
    ProgressStall {
        /// Globally remaining active edges.
        active: u64,
        /// Phases executed.
        phases: usize,
    },
}

impl EngineError {
    /// A short machine-readable tag identifying the kind, for exit
    /// diagnostics.
    pub fn tag(&self) -> &'static str {
        match self {
            EngineError::BallOverflow { .. } => "ball-overflow",
            EngineError::BudgetExceeded { .. } => "budget-exceeded",
            EngineError::InvariantViolation(_) => "invariant-violation",
            EngineError::SymmetricIdFailure { .. } => "symmetric-id-failure",
            EngineError::Fabric(_) => "fabric-error",
            EngineError::MalformedGraph { .. } => "malformed-graph",
            EngineError::ProgressStall { .. } => "progress-stall",
        }
    }
}
