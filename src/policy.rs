//----------------------------------------------------------------------------------------------
// Module policy
// Acquisition policy (C4): the single consumer interface the reader feeds classified frames
// into. Grounded in pyxcp/transport/base.py's FrameAcquisitionPolicy / NoOpPolicy /
// LegacyFrameAcquisitionPolicy / FrameRecorderPolicy / StdoutPolicy hierarchy, generalized to a
// Rust trait object so a session can be built with any one of them (or a user's own).

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;

use crate::types::FrameCategory;

/// Consumer plugin for classified frames. `feed` must be cheap and non-blocking: it runs inline
/// on the reader thread (spec.md section 5 -- "never awaits on user code except through a
/// bounded policy callback").
pub trait AcquisitionPolicy: Send + Sync {
    fn feed(&self, category: FrameCategory, counter: u16, timestamp_ns: u64, payload: &[u8]);
    fn finalize(&self) {}
    /// Categories this policy does not want to see; the channel filters them out before `feed`.
    fn filter_out(&self) -> HashSet<FrameCategory> {
        HashSet::new()
    }
}

/// Discards everything. The correctness-critical default: guarantees O(1) memory so a DAQ
/// session can run for hours without growth (spec.md section 8, property 6).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpPolicy;

impl AcquisitionPolicy for NoOpPolicy {
    fn feed(&self, _category: FrameCategory, _counter: u16, _timestamp_ns: u64, _payload: &[u8]) {}
}

/// One captured frame, as handed to a `QueuePolicy` consumer.
#[derive(Debug, Clone)]
pub struct QueuedFrame {
    pub category: FrameCategory,
    pub counter: u16,
    pub timestamp_ns: u64,
    pub payload: Vec<u8>,
}

/// Appends to a bounded per-instance queue the host drains; oldest entries are dropped once the
/// bound is reached rather than growing without limit.
pub struct QueuePolicy {
    queue: Mutex<VecDeque<QueuedFrame>>,
    capacity: usize,
}

impl QueuePolicy {
    pub fn new(capacity: usize) -> Self {
        QueuePolicy { queue: Mutex::new(VecDeque::with_capacity(capacity.min(4096))), capacity }
    }

    pub fn drain(&self) -> Vec<QueuedFrame> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AcquisitionPolicy for QueuePolicy {
    fn feed(&self, category: FrameCategory, counter: u16, timestamp_ns: u64, payload: &[u8]) {
        let mut q = self.queue.lock();
        if q.len() >= self.capacity {
            q.pop_front();
        }
        q.push_back(QueuedFrame { category, counter, timestamp_ns, payload: payload.to_vec() });
    }
}

/// Pretty-prints every frame to stdout; intended for interactive debugging sessions only.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutPolicy;

impl AcquisitionPolicy for StdoutPolicy {
    fn feed(&self, category: FrameCategory, counter: u16, timestamp_ns: u64, payload: &[u8]) {
        println!("[{timestamp_ns:>15} ns] ctr={counter:<5} {category:?} {payload:02X?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_policy_bounds_memory() {
        let policy = QueuePolicy::new(4);
        for i in 0..10u16 {
            policy.feed(FrameCategory::Daq, i, i as u64, &[i as u8]);
        }
        assert_eq!(policy.len(), 4);
        let drained = policy.drain();
        // The oldest entries were evicted; only the last 4 remain, in order.
        assert_eq!(drained.iter().map(|f| f.counter).collect::<Vec<_>>(), vec![6, 7, 8, 9]);
        assert!(policy.is_empty());
    }

    #[test]
    fn noop_policy_does_nothing_observable() {
        let policy = NoOpPolicy;
        policy.feed(FrameCategory::Daq, 0, 0, &[1, 2, 3]);
        policy.finalize();
    }
}
