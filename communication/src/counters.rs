//! Accounting for fabric traffic.

use std::time::Duration;

/// Cumulative traffic counters for one worker's fabric endpoint.
///
/// Counters only ever increase; consumers interested in per-phase figures
/// should snapshot with [`Counters::snapshot`] and subtract.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    /// Bytes handed to the fabric for sending, as measured by abomonation.
    pub bytes_sent: u64,
    /// Bytes received from peers, as measured by abomonation.
    pub bytes_received: u64,
    /// Records handed to the fabric for sending.
    pub records_sent: u64,
    /// Records received from peers.
    pub records_received: u64,
    /// Largest single transported message, in bytes.
    pub max_message_bytes: u64,
    /// Number of logical exchange calls.
    pub calls: u64,
    /// Nanoseconds spent blocked inside fabric calls.
    pub blocked_nanos: u64,
}

impl Counters {
    /// Notes an outgoing bucket.
    pub fn record_send(&mut self, bytes: u64, records: u64) {
        self.bytes_sent += bytes;
        self.records_sent += records;
    }

    /// Notes an incoming bucket.
    pub fn record_recv(&mut self, bytes: u64, records: u64) {
        self.bytes_received += bytes;
        self.records_received += records;
    }

    /// Notes the size of a single transported message.
    pub fn note_message(&mut self, bytes: u64) {
        if bytes > self.max_message_bytes {
            self.max_message_bytes = bytes;
        }
    }

    /// Notes wall time spent blocked in one fabric call.
    pub fn note_blocked(&mut self, elapsed: Duration) {
        self.calls += 1;
        self.blocked_nanos += elapsed.as_nanos() as u64;
    }

    /// Returns a copy of the current totals.
    pub fn snapshot(&self) -> Counters {
        *self
    }

    /// Totals accumulated since `earlier` was snapshot.
    pub fn since(&self, earlier: &Counters) -> Counters {
        Counters {
            bytes_sent: self.bytes_sent - earlier.bytes_sent,
            bytes_received: self.bytes_received - earlier.bytes_received,
            records_sent: self.records_sent - earlier.records_sent,
            records_received: self.records_received - earlier.records_received,
            max_message_bytes: self.max_message_bytes,
            calls: self.calls - earlier.calls,
            blocked_nanos: self.blocked_nanos - earlier.blocked_nanos,
        }
    }

    /// Time spent blocked inside fabric calls.
    pub fn blocked(&self) -> Duration {
        Duration::from_nanos(self.blocked_nanos)
    }
}

#[cfg(test)]
mod test {
    use super::Counters;
    use std::time::Duration;

    #[test]
    fn since_subtracts_monotone_fields() {
        let mut counters = Counters::default();
        counters.record_send(100, 10);
        let earlier = counters.snapshot();
        counters.record_send(50, 5);
        counters.record_recv(30, 3);
        counters.note_blocked(Duration::from_millis(1));
        let delta = counters.since(&earlier);
        assert_eq!(delta.bytes_sent, 50);
        assert_eq!(delta.records_sent, 5);
        assert_eq!(delta.bytes_received, 30);
        assert_eq!(delta.calls, 1);
    }
}
