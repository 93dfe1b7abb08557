//! A strongly sublinear distributed maximal-matching engine.
//!
//! The engine computes a maximal matching on an undirected graph whose edge
//! set is sharded over `p` lockstep workers, each bounded by a per-machine
//! edge budget `S = c · n^α` with `α < 1`. Workers communicate exclusively
//! through the collective exchange fabric of
//! [`matching_communication`]; every cross-worker reference is a global
//! identifier produced by the keyed hash in [`hashing`].
//!
//! Each phase samples the active edges into an implicit sparsified line
//! graph, stalls the over-dense participants, grows bounded-radius balls
//! around the rest without ever materializing line-graph adjacency, selects
//! a deterministic-priority independent set on each worker, and integrates
//! the choices into a globally valid matching. A finisher absorbs the small
//! residual. The contract is maximality, not optimality: no active edge
//! survives with both endpoints unmatched, and no vertex is matched twice.
//!
//! ```no_run
//! use matching::{run, Config};
//! use matching_communication::{initialize, Configuration};
//!
//! let guards = initialize(Configuration::Process(4), |mut fabric| {
//!     let pairs = vec![(1, 2), (2, 3), (3, 4)];
//!     run(&mut fabric, &Config::default(), pairs, 4).map(|outcome| outcome.global_size)
//! });
//! for result in guards.unwrap().join() {
//!     println!("matched: {:?}", result.unwrap());
//! }
//! ```

#![forbid(missing_docs)]

pub mod config;
pub mod driver;
pub mod error;
pub mod hashing;
pub mod memory;
pub mod metrics;
pub mod params;
pub mod phases;
pub mod protocol;
pub mod state;

pub use config::Config;
pub use driver::{gather_matching, run, Outcome};
pub use error::EngineError;
pub use hashing::KeyedHasher;
pub use metrics::{PhaseMetrics, RunMetrics};
pub use state::MatchedEdge;
