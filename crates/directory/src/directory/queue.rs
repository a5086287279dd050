//! Timed outgoing queues.
//!
//! Handlers never deliver messages directly; they push them here with a
//! delivery cycle. Each tick the controller pops everything that is due.
//! Messages due in the same cycle leave in the order they were pushed.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::protocol::MemEvent;

struct Timed {
    time: u64,
    seq: u64,
    event: MemEvent,
}

impl PartialEq for Timed {
    fn eq(&self, other: &Self) -> bool {
        (self.time, self.seq) == (other.time, other.seq)
    }
}

impl Eq for Timed {}

impl Ord for Timed {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on (time, seq).
        (other.time, other.seq).cmp(&(self.time, self.seq))
    }
}

impl PartialOrd for Timed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Outgoing messages ordered by delivery cycle.
#[derive(Default)]
pub struct OutQueue {
    heap: BinaryHeap<Timed>,
    seq: u64,
}

impl std::fmt::Debug for OutQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutQueue").field("len", &self.heap.len()).finish()
    }
}

impl OutQueue {
    /// Schedules `event` for delivery at cycle `time`.
    pub fn push(&mut self, time: u64, event: MemEvent) {
        self.heap.push(Timed {
            time,
            seq: self.seq,
            event,
        });
        self.seq += 1;
    }

    /// Removes the next message due at or before `now`.
    pub fn pop_due(&mut self, now: u64) -> Option<MemEvent> {
        if self.heap.peek().is_some_and(|t| t.time <= now) {
            self.heap.pop().map(|t| t.event)
        } else {
            None
        }
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Queued messages with their delivery cycle, in delivery order.
    pub fn snapshot(&self) -> Vec<(u64, &MemEvent)> {
        let mut all: Vec<&Timed> = self.heap.iter().collect();
        all.sort_by_key(|t| (t.time, t.seq));
        all.into_iter().map(|t| (t.time, &t.event)).collect()
    }
}
