//! Directory-entry residency.
//!
//! Entries live in a bounded recency cache. An entry pushed out of it is
//! written to memory with a synthetic `PutE` and its `cached` flag cleared;
//! the next event that needs it issues a synthetic `GetS` and waits in the
//! MSHR until the read returns.

use tracing::trace;

use super::DirectoryController;
use crate::common::{Addr, DirectoryError};
use crate::protocol::{Command, MemEvent, MemFlags, State};

/// Address used for synthetic entry traffic; memory only times it.
const ENTRY_SPILL_ADDR: Addr = 0;

impl DirectoryController {
    /// Returns true if the entry for `event`'s line is resident.
    ///
    /// Otherwise a reload is started and the caller must wait; the event is
    /// expected to be queued in the MSHR already.
    pub(super) fn check_resident(&mut self, event: &MemEvent) -> Result<bool, DirectoryError> {
        let addr = event.base_addr;
        if self.entry_mut(addr).is_cached() {
            self.stats.entry_cache_hits += 1;
            return Ok(true);
        }
        self.load_entry(event)?;
        Ok(false)
    }

    /// Issues the synthetic read for a spilled entry unless one is already in flight.
    pub(super) fn load_entry(&mut self, event: &MemEvent) -> Result<(), DirectoryError> {
        let addr = event.base_addr;
        let entry = self.entry_mut(addr);
        if entry.is_cached() || entry.state().is_loading() {
            return Ok(());
        }
        let from = entry.state();
        let Some(loading) = from.loading() else {
            return Err(self.violation(event, from));
        };
        self.set_state(addr, loading);

        let dst = self.memory_name(ENTRY_SPILL_ADDR);
        let read = MemEvent::new(self.name.clone(), ENTRY_SPILL_ADDR, ENTRY_SPILL_ADDR, Command::GetS)
            .with_dst(dst)
            .with_size(self.config.entry_size);
        let _ = self.dir_entry_miss.insert(read.id, addr);
        self.stats.memory_entry_reads += 1;
        trace!(dir = %self.name, addr, "reloading directory entry");
        self.send_to_memory(read);
        Ok(())
    }

    /// Completes an entry reload and wakes the event that needed it.
    pub(super) fn handle_entry_response(&mut self, event: &MemEvent, addr: Addr) -> Result<(), DirectoryError> {
        let from = self.state(addr);
        let Some(stable) = from.loaded() else {
            return Err(self.violation(event, from));
        };
        self.set_state(addr, stable);
        self.entry_mut(addr).set_cached(true);
        self.entry_cache.touch(addr);
        self.replay_waiting(addr);
        self.replay_puts(addr);
        Ok(())
    }

    fn line_busy(&self, addr: Addr) -> bool {
        self.mshr.is_hit(addr) || self.mshr.is_in_progress(addr) || self.mshr.acks_needed(addr) > 0
    }

    /// Refreshes recency for `addr` and spills entries beyond capacity.
    pub(super) fn update_cache(&mut self, addr: Addr) {
        let Some(entry) = self.store.get(addr) else {
            return;
        };
        let state = entry.state();
        let cached = entry.is_cached();

        if state == State::I && !self.line_busy(addr) {
            let _ = self.entry_cache.remove(addr);
            let _ = self.store.remove(addr);
            return;
        }
        if !cached {
            return;
        }
        if self.entry_cache.capacity() == 0 {
            if state.is_stable() && !self.line_busy(addr) {
                self.evict(addr);
            }
            return;
        }

        self.entry_cache.touch(addr);
        while self.entry_cache.over_capacity() {
            let Some(victim) = self.entry_cache.lru() else {
                break;
            };
            let evictable = !self.line_busy(victim) && self.state(victim).is_stable();
            if !evictable {
                break;
            }
            self.evict(victim);
        }
    }

    /// Drops an `I` entry or spills any other one to memory.
    fn evict(&mut self, addr: Addr) {
        self.stats.entry_evictions += 1;
        let _ = self.entry_cache.remove(addr);
        if self.state(addr) == State::I {
            trace!(dir = %self.name, addr, "dropping invalid entry");
            let _ = self.store.remove(addr);
            return;
        }
        trace!(dir = %self.name, addr, state = %self.state(addr), "spilling entry");
        self.entry_mut(addr).set_cached(false);
        let dst = self.memory_name(ENTRY_SPILL_ADDR);
        let write = MemEvent::new(self.name.clone(), ENTRY_SPILL_ADDR, ENTRY_SPILL_ADDR, Command::PutE)
            .with_dst(dst)
            .with_size(self.config.entry_size)
            .with_flags(MemFlags::NO_RESPONSE);
        self.stats.memory_entry_writes += 1;
        self.send_to_memory(write);
    }
}
