//! A generic endpoint wrapping the concrete transports.

use crate::allocator::process::{Process, ProcessBuilder};
use crate::allocator::thread::{Thread, ThreadBuilder};
use crate::allocator::FabricBuilder;
use crate::counters::Counters;
use crate::fabric::{Fabric, FabricError};
use crate::Data;

/// Enumerates the fabric builders this crate can construct.
pub enum GenericBuilder {
    /// A single-worker builder.
    Thread(ThreadBuilder),
    /// An intra-process builder.
    Process(ProcessBuilder),
}

impl FabricBuilder for GenericBuilder {
    type Fabric = Generic;
    fn build(self) -> Generic {
        match self {
            GenericBuilder::Thread(builder) => Generic::Thread(builder.build()),
            GenericBuilder::Process(builder) => Generic::Process(builder.build()),
        }
    }
}

/// Enumerates the concrete fabric endpoints.
pub enum Generic {
    /// A single-worker endpoint.
    Thread(Thread),
    /// An intra-process endpoint.
    Process(Process),
}

impl Fabric for Generic {
    fn index(&self) -> usize {
        match self {
            Generic::Thread(fabric) => fabric.index(),
            Generic::Process(fabric) => fabric.index(),
        }
    }

    fn peers(&self) -> usize {
        match self {
            Generic::Thread(fabric) => fabric.peers(),
            Generic::Process(fabric) => fabric.peers(),
        }
    }

    fn exchange<T: Data>(
        &mut self,
        identifier: usize,
        sends: Vec<Vec<T>>,
    ) -> Result<Vec<Vec<T>>, FabricError> {
        match self {
            Generic::Thread(fabric) => fabric.exchange(identifier, sends),
            Generic::Process(fabric) => fabric.exchange(identifier, sends),
        }
    }

    fn abort(&mut self, reason: String) {
        match self {
            Generic::Thread(fabric) => fabric.abort(reason),
            Generic::Process(fabric) => fabric.abort(reason),
        }
    }

    fn counters(&mut self) -> &mut Counters {
        match self {
            Generic::Thread(fabric) => fabric.counters(),
            Generic::Process(fabric) => fabric.counters(),
        }
    }
}
