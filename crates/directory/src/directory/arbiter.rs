//! Per-tick arbitration.
//!
//! Each address may be mutated by at most one event per tick, and a tick may
//! process a bounded number of events. The arbiter is reset at the start of
//! every tick.

use std::collections::HashSet;

use crate::common::Addr;

/// Addresses claimed this tick and the processing budget.
#[derive(Debug)]
pub struct Arbiter {
    claimed: HashSet<Addr>,
    processed: usize,
    limit: usize,
}

impl Arbiter {
    /// Creates an arbiter; a `limit` of 0 means no per-tick cap.
    pub fn new(limit: usize) -> Self {
        Self {
            claimed: HashSet::new(),
            processed: 0,
            limit: if limit == 0 { usize::MAX } else { limit },
        }
    }

    /// Starts a new tick.
    pub fn reset(&mut self) {
        self.claimed.clear();
        self.processed = 0;
    }

    /// Claims `addr` for this tick; returns false if another event already holds it.
    pub fn claim(&mut self, addr: Addr) -> bool {
        self.claimed.insert(addr)
    }

    /// Returns true if `addr` was claimed this tick.
    pub fn is_claimed(&self, addr: Addr) -> bool {
        self.claimed.contains(&addr)
    }

    /// Counts one processed event against the budget.
    pub const fn note_processed(&mut self) {
        self.processed += 1;
    }

    /// Returns true once the per-tick budget is spent.
    pub const fn exhausted(&self) -> bool {
        self.processed >= self.limit
    }
}
