//! A degenerate fabric for a single worker.

use crate::allocator::{AbortLatch, FabricBuilder};
use crate::counters::Counters;
use crate::fabric::{Fabric, FabricError};
use crate::Data;

/// Builder for the single-worker fabric.
pub struct ThreadBuilder;

impl FabricBuilder for ThreadBuilder {
    type Fabric = Thread;
    fn build(self) -> Self::Fabric {
        Thread::new()
    }
}

/// A fabric endpoint for a lone worker.
///
/// Exchanges return the caller's own bucket; collectives reduce over one
/// contribution. Aborts still latch so that error paths behave the same as
/// in the multi-worker transports.
pub struct Thread {
    latch: AbortLatch,
    counters: Counters,
}

impl Thread {
    /// Allocates a new single-worker endpoint.
    pub fn new() -> Self {
        Thread {
            latch: AbortLatch::new(),
            counters: Counters::default(),
        }
    }
}

impl Default for Thread {
    fn default() -> Self {
        Thread::new()
    }
}

impl Fabric for Thread {
    fn index(&self) -> usize {
        0
    }

    fn peers(&self) -> usize {
        1
    }

    fn exchange<T: Data>(
        &mut self,
        _identifier: usize,
        mut sends: Vec<Vec<T>>,
    ) -> Result<Vec<Vec<T>>, FabricError> {
        assert_eq!(sends.len(), 1, "exchange requires one bucket per peer");
        self.latch.check()?;
        let bucket = sends.pop().expect("bucket for self");
        let bytes = abomonation::measure(&bucket) as u64;
        let records = bucket.len() as u64;
        self.counters.record_send(bytes, records);
        self.counters.record_recv(bytes, records);
        self.counters.note_message(bytes);
        self.counters.note_blocked(std::time::Duration::ZERO);
        Ok(vec![bucket])
    }

    fn abort(&mut self, reason: String) {
        self.latch.trip(reason);
    }

    fn counters(&mut self) -> &mut Counters {
        &mut self.counters
    }
}

#[cfg(test)]
mod test {
    use super::Thread;
    use crate::fabric::{Fabric, FabricError};

    #[test]
    fn exchange_returns_own_bucket() {
        let mut fabric = Thread::new();
        let received = fabric.exchange(100, vec![vec![1u64, 2, 3]]).unwrap();
        assert_eq!(received, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn collectives_reduce_over_self() {
        let mut fabric = Thread::new();
        assert_eq!(fabric.allreduce_sum(7).unwrap(), 7);
        assert_eq!(fabric.allreduce_max(7).unwrap(), 7);
        assert_eq!(fabric.allreduce_union(vec![3, 1, 3]).unwrap(), vec![1, 3]);
        fabric.barrier().unwrap();
    }

    #[test]
    fn abort_latches() {
        let mut fabric = Thread::new();
        fabric.abort("test".to_owned());
        match fabric.exchange::<u64>(100, vec![Vec::new()]) {
            Err(FabricError::Aborted(reason)) => assert_eq!(reason, "test"),
            other => panic!("expected abort, got {:?}", other),
        }
    }
}
