//! Directory-entry cache.
//!
//! Tracks which resident entries were touched least recently so the directory
//! can bound the number of resident records. Only recency is kept here; the
//! records themselves live in the entry store, and the controller decides
//! whether a victim is dropped or spilled.

use std::collections::{BTreeMap, HashMap};

use crate::common::Addr;

/// Recency order over resident entries.
///
/// Each touch stamps the address with a monotonically increasing generation;
/// the smallest generation is the least recently used.
#[derive(Debug)]
pub struct EntryCache {
    capacity: usize,
    clock: u64,
    stamps: HashMap<Addr, u64>,
    order: BTreeMap<u64, Addr>,
}

impl EntryCache {
    /// Creates an empty cache holding up to `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            clock: 0,
            stamps: HashMap::new(),
            order: BTreeMap::new(),
        }
    }

    /// Configured capacity.
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries tracked.
    #[inline]
    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    /// Returns true if nothing is tracked.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    /// Returns true if more entries are tracked than the capacity allows.
    #[inline]
    pub fn over_capacity(&self) -> bool {
        self.stamps.len() > self.capacity
    }

    /// Returns true if `addr` is tracked.
    pub fn contains(&self, addr: Addr) -> bool {
        self.stamps.contains_key(&addr)
    }

    /// Moves `addr` to the most-recently-used position, inserting it if absent.
    pub fn touch(&mut self, addr: Addr) {
        self.clock += 1;
        if let Some(old) = self.stamps.insert(addr, self.clock) {
            let _ = self.order.remove(&old);
        }
        let _ = self.order.insert(self.clock, addr);
    }

    /// Stops tracking `addr`; returns true if it was tracked.
    pub fn remove(&mut self, addr: Addr) -> bool {
        self.stamps
            .remove(&addr)
            .is_some_and(|stamp| self.order.remove(&stamp).is_some())
    }

    /// Least recently used address.
    pub fn lru(&self) -> Option<Addr> {
        self.order.values().next().copied()
    }

    /// Addresses from least to most recently used.
    pub fn iter(&self) -> impl Iterator<Item = Addr> + '_ {
        self.order.values().copied()
    }
}
