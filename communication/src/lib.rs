//! A simple communication infrastructure providing typed collective exchanges.
//!
//! This crate is the inter-worker substrate of the matching engine, separated
//! out mostly to make clear boundaries in the project. It exposes a [`Fabric`]
//! trait whose one essential primitive is `exchange`: every worker contributes
//! one typed record bucket per peer and receives one bucket per peer, with
//! per-(source, destination) FIFO ordering and internal chunking so that no
//! single transported buffer grows past the configured chunk limit.
//! Collectives (barrier, allreduce, gather, broadcast) are derived from
//! `exchange` and inherit its blocking and failure semantics.
//!
//! Workers are spawned with [`initialize`], which hands each worker thread its
//! own fabric endpoint:
//!
//! ```
//! use matching_communication::{initialize, Configuration, Fabric};
//!
//! // configure for three workers in one process.
//! let config = Configuration::Process(3);
//!
//! let guards = initialize(config, |mut fabric| {
//!     // address every peer, including ourselves.
//!     let sends = (0..fabric.peers())
//!         .map(|peer| vec![((fabric.index() as u64) << 8) | peer as u64])
//!         .collect();
//!     let received = fabric.exchange(100, sends).unwrap();
//!     assert_eq!(received.len(), fabric.peers());
//!     fabric.index()
//! });
//!
//! for result in guards.unwrap().join() {
//!     result.unwrap();
//! }
//! ```
//!
//! To be communicated, a type must implement [`Data`], which requires
//! [`Abomonation`](abomonation::Abomonation); the fabric uses
//! `abomonation::measure` for chunk sizing and byte accounting even where the
//! transport itself moves typed records without serializing them.

#![forbid(missing_docs)]

pub mod allocator;
pub mod counters;
pub mod fabric;
pub mod initialize;

use abomonation::Abomonation;

pub use allocator::{AbortLatch, FabricBuilder, Generic, Process, Thread};
pub use counters::Counters;
pub use fabric::{Fabric, FabricError};
pub use initialize::{initialize, initialize_from, Configuration, WorkerGuards};

/// A composite trait for types that may be exchanged between workers.
pub trait Data: Send + Clone + Abomonation + 'static {}
impl<T: Send + Clone + Abomonation + 'static> Data for T {}
