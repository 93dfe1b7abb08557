//! Typed inter-thread, intra-process collective exchanges.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::allocator::{AbortLatch, FabricBuilder};
use crate::counters::Counters;
use crate::fabric::{Fabric, FabricError, CHUNK_LIMIT};
use crate::Data;

/// How long a blocked receiver waits before re-checking the abort latch.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One transported message: a per-call header or a chunk of records.
///
/// Each logical exchange sends exactly one header per (source, destination)
/// followed by `chunks` chunk messages, all stamped with the call sequence
/// number so receivers can set aside messages from a peer that has already
/// raced ahead into the next call on the same channel.
enum Envelope<T> {
    Header {
        source: usize,
        seq: u64,
        chunks: usize,
    },
    Chunk {
        source: usize,
        seq: u64,
        records: Vec<T>,
    },
}

impl<T> Envelope<T> {
    fn seq(&self) -> u64 {
        match self {
            Envelope::Header { seq, .. } => *seq,
            Envelope::Chunk { seq, .. } => *seq,
        }
    }
}

/// This worker's endpoints for one channel: senders to every peer, its own
/// receiver, the call sequence counter, and messages set aside for later
/// calls.
struct Mesh<T> {
    senders: Vec<Sender<Envelope<T>>>,
    receiver: Receiver<Envelope<T>>,
    seq: u64,
    leftover: VecDeque<Envelope<T>>,
}

type Slots<T> = Vec<Option<(Vec<Sender<Envelope<T>>>, Receiver<Envelope<T>>)>>;

/// A builder for an inter-thread, intra-process fabric endpoint.
pub struct ProcessBuilder {
    index: usize,
    peers: usize,
    // below: `Box<Any + Send>` is a `Slots<T>` for the channel's record type
    channels: Arc<Mutex<HashMap<usize, Box<dyn Any + Send>>>>,
    latch: AbortLatch,
}

impl FabricBuilder for ProcessBuilder {
    type Fabric = Process;
    fn build(self) -> Self::Fabric {
        Process {
            index: self.index,
            peers: self.peers,
            channels: self.channels,
            latch: self.latch,
            local: HashMap::new(),
            chunk_limit: CHUNK_LIMIT,
            counters: Counters::default(),
        }
    }
}

/// A fabric endpoint for inter-thread, intra-process communication.
pub struct Process {
    index: usize,
    peers: usize,
    channels: Arc<Mutex<HashMap<usize, Box<dyn Any + Send>>>>,
    latch: AbortLatch,
    local: HashMap<usize, Box<dyn Any>>,
    chunk_limit: usize,
    counters: Counters,
}

impl Process {
    /// Allocates a list of connected intra-process endpoint builders.
    pub fn new_vector(peers: usize) -> Vec<ProcessBuilder> {
        assert!(peers > 0, "at least one worker required");
        let channels = Arc::new(Mutex::new(HashMap::new()));
        let latch = AbortLatch::new();
        (0..peers)
            .map(|index| ProcessBuilder {
                index,
                peers,
                channels: channels.clone(),
                latch: latch.clone(),
            })
            .collect()
    }

    /// Overrides the chunking bound, mostly to exercise chunking in tests.
    pub fn set_chunk_limit(&mut self, bytes: usize) {
        assert!(bytes > 0, "chunk limit must be positive");
        self.chunk_limit = bytes;
    }

    /// Claims this worker's endpoints for `identifier` from the shared
    /// registry, racing with peers to allocate the mesh on first use.
    fn claim<T: Data>(&self, identifier: usize) -> Mesh<T> {
        let mut registry = self.channels.lock().expect("channel registry poisoned");
        let (mesh, empty) = {
            let peers = self.peers;
            let entry = registry.entry(identifier).or_insert_with(|| {
                let mut senders = Vec::with_capacity(peers);
                let mut receivers = Vec::with_capacity(peers);
                for _ in 0..peers {
                    let (send, recv) = channel();
                    senders.push(send);
                    receivers.push(recv);
                }
                let slots: Slots<T> = receivers
                    .into_iter()
                    .map(|recv| Some((senders.clone(), recv)))
                    .collect();
                Box::new(slots) as Box<dyn Any + Send>
            });
            let slots = entry
                .downcast_mut::<Slots<T>>()
                .expect("channel identifier reused with a different record type");
            let (senders, receiver) = slots[self.index]
                .take()
                .expect("channel endpoints already claimed");
            let empty = slots.iter().all(|slot| slot.is_none());
            let mesh = Mesh {
                senders,
                receiver,
                seq: 0,
                leftover: VecDeque::new(),
            };
            (mesh, empty)
        };
        // once every worker holds its endpoints the registry entry is spent
        if empty {
            registry.remove(&identifier);
        }
        mesh
    }
}

impl Fabric for Process {
    fn index(&self) -> usize {
        self.index
    }

    fn peers(&self) -> usize {
        self.peers
    }

    fn exchange<T: Data>(
        &mut self,
        identifier: usize,
        sends: Vec<Vec<T>>,
    ) -> Result<Vec<Vec<T>>, FabricError> {
        assert_eq!(
            sends.len(),
            self.peers,
            "exchange requires one bucket per peer"
        );
        let start = Instant::now();
        if !self.local.contains_key(&identifier) {
            let mesh = self.claim::<T>(identifier);
            self.local.insert(identifier, Box::new(mesh));
        }
        let mut boxed = self.local.remove(&identifier).expect("mesh just ensured");
        let mesh = boxed
            .downcast_mut::<Mesh<T>>()
            .expect("channel identifier reused with a different record type");
        let result = run_exchange(
            self.index,
            self.peers,
            self.chunk_limit,
            &self.latch,
            &mut self.counters,
            mesh,
            sends,
        );
        self.local.insert(identifier, boxed);
        self.counters.note_blocked(start.elapsed());
        result
    }

    fn abort(&mut self, reason: String) {
        self.latch.trip(reason);
    }

    fn counters(&mut self) -> &mut Counters {
        &mut self.counters
    }
}

/// One logical exchange: headers and chunks out, then a blocking receive
/// loop until every source's announced chunks have arrived.
fn run_exchange<T: Data>(
    index: usize,
    peers: usize,
    chunk_limit: usize,
    latch: &AbortLatch,
    counters: &mut Counters,
    mesh: &mut Mesh<T>,
    sends: Vec<Vec<T>>,
) -> Result<Vec<Vec<T>>, FabricError> {
    latch.check()?;
    let seq = mesh.seq;
    mesh.seq += 1;

    // a peer that aborted may already have hung up its endpoints; report
    // the abort, not the closed channel
    let send_failure = || match latch.check() {
        Err(aborted) => aborted,
        Ok(()) => FabricError::Transport("peer hung up".to_owned()),
    };

    for (peer, bucket) in sends.into_iter().enumerate() {
        let bytes = abomonation::measure(&bucket) as u64;
        counters.record_send(bytes, bucket.len() as u64);
        let pieces = split_chunks(bucket, chunk_limit);
        mesh.senders[peer]
            .send(Envelope::Header {
                source: index,
                seq,
                chunks: pieces.len(),
            })
            .map_err(|_| send_failure())?;
        for piece in pieces {
            counters.note_message(abomonation::measure(&piece) as u64);
            mesh.senders[peer]
                .send(Envelope::Chunk {
                    source: index,
                    seq,
                    records: piece,
                })
                .map_err(|_| send_failure())?;
        }
    }

    let mut expected: Vec<Option<usize>> = vec![None; peers];
    let mut seen = vec![0usize; peers];
    let mut received: Vec<Vec<T>> = (0..peers).map(|_| Vec::new()).collect();
    let mut done = 0;

    // messages set aside by earlier calls may belong to this one
    let stashed: Vec<Envelope<T>> = mesh.leftover.drain(..).collect();
    for envelope in stashed {
        if envelope.seq() == seq {
            absorb(envelope, &mut expected, &mut seen, &mut received, &mut done);
        } else {
            mesh.leftover.push_back(envelope);
        }
    }

    while done < peers {
        match mesh.receiver.recv_timeout(POLL_INTERVAL) {
            Ok(envelope) => {
                if envelope.seq() == seq {
                    absorb(envelope, &mut expected, &mut seen, &mut received, &mut done);
                } else {
                    debug_assert!(envelope.seq() > seq, "envelope from a completed call");
                    mesh.leftover.push_back(envelope);
                }
            }
            Err(RecvTimeoutError::Timeout) => latch.check()?,
            Err(RecvTimeoutError::Disconnected) => return Err(send_failure()),
        }
    }

    for bucket in &received {
        counters.record_recv(abomonation::measure(bucket) as u64, bucket.len() as u64);
    }
    Ok(received)
}

/// Folds one envelope into the per-source receive state.
fn absorb<T>(
    envelope: Envelope<T>,
    expected: &mut [Option<usize>],
    seen: &mut [usize],
    received: &mut [Vec<T>],
    done: &mut usize,
) {
    match envelope {
        Envelope::Header { source, chunks, .. } => {
            debug_assert!(expected[source].is_none(), "duplicate header");
            expected[source] = Some(chunks);
            if seen[source] == chunks {
                *done += 1;
            }
        }
        Envelope::Chunk {
            source,
            mut records,
            ..
        } => {
            received[source].append(&mut records);
            seen[source] += 1;
            if expected[source] == Some(seen[source]) {
                *done += 1;
            }
        }
    }
}

/// Splits a bucket into pieces of at most `limit` bytes each.
///
/// An empty bucket produces no pieces, so only the header travels.
fn split_chunks<T: Data>(bucket: Vec<T>, limit: usize) -> Vec<Vec<T>> {
    if bucket.is_empty() {
        return Vec::new();
    }
    let bytes = abomonation::measure(&bucket);
    if bytes <= limit {
        return vec![bucket];
    }
    // each piece pays the container overhead again
    let overhead = abomonation::measure(&Vec::<T>::new());
    let payload = bytes.saturating_sub(overhead);
    let per_record = (payload + bucket.len() - 1) / bucket.len();
    let capacity = std::cmp::max(
        1,
        limit.saturating_sub(overhead) / std::cmp::max(per_record, 1),
    );
    let mut pieces = Vec::new();
    let mut rest = bucket;
    while rest.len() > capacity {
        let tail = rest.split_off(capacity);
        pieces.push(rest);
        rest = tail;
    }
    pieces.push(rest);
    pieces
}

#[cfg(test)]
mod test {
    use super::Process;
    use crate::fabric::{Fabric, FabricError};
    use std::thread;

    fn spawn<F, T>(peers: usize, logic: F) -> Vec<T>
    where
        F: Fn(Process) -> T + Send + Sync + Copy + 'static,
        T: Send + 'static,
    {
        use crate::allocator::FabricBuilder;
        let handles: Vec<_> = Process::new_vector(peers)
            .into_iter()
            .map(|builder| thread::spawn(move || logic(builder.build())))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker panic"))
            .collect()
    }

    #[test]
    fn exchange_routes_by_destination() {
        spawn(3, |mut fabric: Process| {
            let index = fabric.index() as u64;
            let sends = (0..3).map(|peer| vec![index * 10 + peer as u64]).collect();
            let received = fabric.exchange(100, sends).unwrap();
            for (source, bucket) in received.iter().enumerate() {
                assert_eq!(bucket, &vec![source as u64 * 10 + index]);
            }
        });
    }

    #[test]
    fn repeated_exchanges_keep_calls_separate() {
        spawn(2, |mut fabric: Process| {
            for round in 0..20u64 {
                let sends = vec![vec![round], vec![round]];
                let received = fabric.exchange(100, sends).unwrap();
                assert_eq!(received, vec![vec![round], vec![round]]);
            }
        });
    }

    #[test]
    fn chunking_reassembles_in_order() {
        spawn(2, |mut fabric: Process| {
            fabric.set_chunk_limit(64);
            let payload: Vec<u64> = (0..1000).collect();
            let sends = vec![payload.clone(), payload.clone()];
            let received = fabric.exchange(101, sends).unwrap();
            assert_eq!(received[0], payload);
            assert_eq!(received[1], payload);
            assert!(fabric.counters().max_message_bytes <= 64);
        });
    }

    #[test]
    fn collectives_agree() {
        let results = spawn(4, |mut fabric: Process| {
            let index = fabric.index() as u64;
            let sum = fabric.allreduce_sum(index + 1).unwrap();
            let max = fabric.allreduce_max(index).unwrap();
            let union = fabric.allreduce_union(vec![index, 100]).unwrap();
            (sum, max, union)
        });
        for (sum, max, union) in results {
            assert_eq!(sum, 10);
            assert_eq!(max, 3);
            assert_eq!(union, vec![0, 1, 2, 3, 100]);
        }
    }

    #[test]
    fn gather_and_broadcast() {
        spawn(3, |mut fabric: Process| {
            let index = fabric.index() as u64;
            let gathered = fabric.gather(0, vec![index]).unwrap();
            if fabric.index() == 0 {
                assert_eq!(gathered, vec![0, 1, 2]);
            } else {
                assert!(gathered.is_empty());
            }
            let words = if fabric.index() == 0 { vec![7, 8] } else { Vec::new() };
            assert_eq!(fabric.broadcast(0, words).unwrap(), vec![7, 8]);
        });
    }

    #[test]
    fn abort_reaches_blocked_peers() {
        let results = spawn(2, |mut fabric: Process| {
            if fabric.index() == 0 {
                fabric.abort("guard tripped".to_owned());
                fabric.exchange::<u64>(102, vec![Vec::new(), Vec::new()])
            } else {
                fabric.exchange::<u64>(102, vec![Vec::new(), Vec::new()])
            }
        });
        for result in results {
            match result {
                Err(FabricError::Aborted(reason)) => assert_eq!(reason, "guard tripped"),
                other => panic!("expected abort, got {:?}", other),
            }
        }
    }
}
