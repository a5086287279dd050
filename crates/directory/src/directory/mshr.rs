//! Miss Status Holding Registers.
//!
//! The MSHR orders every event that has to wait for a line. For each address it
//! keeps a FIFO whose head is the event currently being serviced, and provides:
//! 1. **Admission:** `insert` accepts, queues or rejects an event against a global capacity.
//! 2. **Acknowledgement tracking:** How many invalidation or fetch answers the head still needs.
//! 3. **Data buffering:** A payload that arrived before the entry could accept it.
//! 4. **Writeback markers:** Block later requests until memory acknowledges a writeback.
//! 5. **Flush barrier:** A separate queue allowing one whole-cache flush at a time.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use crate::common::Addr;
use crate::protocol::{EventId, MemEvent};

/// Outcome of an MSHR insertion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MshrStatus {
    /// The event is the head and may act on the line now.
    Ok,
    /// The event is queued behind the head.
    Stall,
    /// The MSHR is full; the caller must NACK the event.
    Reject,
}

/// Where an event enters its address queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertPosition {
    /// Behind everything already queued.
    Back,
    /// Ahead of queued requests, behind an in-progress head and earlier priority events.
    Priority,
}

#[derive(Debug)]
enum Slot {
    Event { event: MemEvent, inv_class: bool },
    Writeback,
}

impl Slot {
    const fn event(&self) -> Option<&MemEvent> {
        match self {
            Self::Event { event, .. } => Some(event),
            Self::Writeback => None,
        }
    }
}

#[derive(Debug, Default)]
struct Register {
    queue: VecDeque<Slot>,
    acks_needed: u32,
    in_progress: bool,
    data: Option<(Vec<u8>, bool)>,
}

impl Register {
    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.acks_needed == 0 && self.data.is_none() && !self.in_progress
    }

    /// Slot for an invalidation-class event: behind a started head and earlier
    /// invalidations. A head still waiting for its entry reload has not
    /// started, so the invalidation passes it.
    fn priority_index(&self) -> usize {
        let mut index = usize::from(self.in_progress && !self.queue.is_empty());
        while let Some(Slot::Event { inv_class: true, .. }) = self.queue.get(index) {
            index += 1;
        }
        index
    }

    fn position(&self, id: EventId) -> Option<usize> {
        self.queue
            .iter()
            .position(|slot| slot.event().is_some_and(|e| e.id == id))
    }
}

/// Per-address request queues with a shared capacity.
#[derive(Debug)]
pub struct Mshr {
    registers: HashMap<Addr, Register>,
    flushes: VecDeque<MemEvent>,
    flush_acks: u32,
    size: usize,
    capacity: usize,
}

impl Mshr {
    /// Creates an empty MSHR holding at most `capacity` queued items.
    pub fn new(capacity: usize) -> Self {
        Self {
            registers: HashMap::new(),
            flushes: VecDeque::new(),
            flush_acks: 0,
            size: 0,
            capacity,
        }
    }

    /// Items currently queued (events, writeback markers and flushes).
    #[inline]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Configured capacity.
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true if the next insertion would be rejected.
    #[inline]
    pub const fn is_full(&self) -> bool {
        self.size >= self.capacity
    }

    /// Returns true if nothing is queued and no flush is outstanding.
    pub fn is_empty(&self) -> bool {
        self.size == 0 && self.registers.is_empty()
    }

    /// Queues an event for `addr`.
    ///
    /// # Arguments
    ///
    /// * `addr` - Line base address.
    /// * `event` - Event to queue.
    /// * `position` - FIFO or priority placement.
    /// * `inv_class` - Whether the event is an invalidation; later priority
    ///   insertions queue behind it.
    ///
    /// # Returns
    ///
    /// `Ok` if the event became the head, `Stall` if it waits behind another
    /// item, or `Reject` if the MSHR is full. A rejected insertion changes nothing.
    pub fn insert(
        &mut self,
        addr: Addr,
        event: MemEvent,
        position: InsertPosition,
        inv_class: bool,
    ) -> MshrStatus {
        if self.is_full() {
            return MshrStatus::Reject;
        }
        let reg = self.registers.entry(addr).or_default();
        let index = match position {
            InsertPosition::Back => reg.queue.len(),
            InsertPosition::Priority => reg.priority_index(),
        };
        reg.queue.insert(index, Slot::Event { event, inv_class });
        self.size += 1;
        if index == 0 { MshrStatus::Ok } else { MshrStatus::Stall }
    }

    /// Queues a writeback marker for `addr`; it is never rejected.
    pub fn insert_writeback(&mut self, addr: Addr) {
        self.registers.entry(addr).or_default().queue.push_back(Slot::Writeback);
        self.size += 1;
    }

    /// Removes the oldest writeback marker for `addr`; returns false if none was queued.
    pub fn remove_writeback(&mut self, addr: Addr) -> bool {
        let Some(reg) = self.registers.get_mut(&addr) else {
            return false;
        };
        let Some(index) = reg.queue.iter().position(|s| matches!(s, Slot::Writeback)) else {
            return false;
        };
        let _ = reg.queue.remove(index);
        self.size -= 1;
        self.cleanup(addr);
        true
    }

    /// Returns true if a writeback marker is queued for `addr`.
    pub fn pending_writeback(&self, addr: Addr) -> bool {
        self.registers
            .get(&addr)
            .is_some_and(|r| r.queue.iter().any(|s| matches!(s, Slot::Writeback)))
    }

    /// Returns true if anything is queued for `addr`.
    #[inline]
    pub fn is_hit(&self, addr: Addr) -> bool {
        self.registers.get(&addr).is_some_and(|r| !r.queue.is_empty())
    }

    /// Returns true if the event with `id` is queued for `addr`.
    pub fn contains(&self, addr: Addr, id: EventId) -> bool {
        self.registers.get(&addr).is_some_and(|r| r.position(id).is_some())
    }

    /// Returns true if the event with `id` is the head for `addr`.
    pub fn is_front(&self, addr: Addr, id: EventId) -> bool {
        self.front(addr).is_some_and(|e| e.id == id)
    }

    /// Head event for `addr`; `None` if the queue is empty or headed by a writeback marker.
    pub fn front(&self, addr: Addr) -> Option<&MemEvent> {
        self.registers.get(&addr)?.queue.front()?.event()
    }

    /// First invalidation-class event queued behind the head.
    pub fn invalidation_behind_head(&self, addr: Addr) -> Option<&MemEvent> {
        self.registers
            .get(&addr)?
            .queue
            .iter()
            .skip(1)
            .find_map(|slot| match slot {
                Slot::Event { event, inv_class: true } => Some(event),
                _ => None,
            })
    }

    /// Removes and returns the head event for `addr`, clearing the in-progress flag.
    pub fn remove_front(&mut self, addr: Addr) -> Option<MemEvent> {
        let reg = self.registers.get_mut(&addr)?;
        if !matches!(reg.queue.front(), Some(Slot::Event { .. })) {
            return None;
        }
        let slot = reg.queue.pop_front();
        reg.in_progress = false;
        self.size -= 1;
        self.cleanup(addr);
        match slot {
            Some(Slot::Event { event, .. }) => Some(event),
            _ => None,
        }
    }

    /// Removes the event with `id` wherever it is queued.
    pub fn remove_event(&mut self, addr: Addr, id: EventId) -> Option<MemEvent> {
        let reg = self.registers.get_mut(&addr)?;
        let index = reg.position(id)?;
        if index == 0 {
            reg.in_progress = false;
        }
        let slot = reg.queue.remove(index);
        self.size -= 1;
        self.cleanup(addr);
        match slot {
            Some(Slot::Event { event, .. }) => Some(event),
            _ => None,
        }
    }

    /// Events queued for `addr`, head first.
    pub fn events(&self, addr: Addr) -> impl Iterator<Item = &MemEvent> + '_ {
        self.registers
            .get(&addr)
            .into_iter()
            .flat_map(|r| r.queue.iter().filter_map(Slot::event))
    }

    /// Marks whether the head for `addr` has issued its outbound work.
    pub fn set_in_progress(&mut self, addr: Addr, in_progress: bool) {
        if let Some(reg) = self.registers.get_mut(&addr) {
            reg.in_progress = in_progress;
        }
    }

    /// Returns true if the head for `addr` is being serviced.
    pub fn is_in_progress(&self, addr: Addr) -> bool {
        self.registers.get(&addr).is_some_and(|r| r.in_progress)
    }

    /// Sets the number of answers the head for `addr` waits for.
    pub fn set_acks_needed(&mut self, addr: Addr, acks: u32) {
        self.registers.entry(addr).or_default().acks_needed = acks;
    }

    /// Adds one expected answer for `addr`.
    pub fn increment_acks_needed(&mut self, addr: Addr) {
        self.registers.entry(addr).or_default().acks_needed += 1;
    }

    /// Records one answer for `addr`.
    ///
    /// # Returns
    ///
    /// True exactly when the count reaches zero with this call.
    pub fn decrement_acks_needed(&mut self, addr: Addr) -> bool {
        let Some(reg) = self.registers.get_mut(&addr) else {
            return false;
        };
        if reg.acks_needed == 0 {
            return false;
        }
        reg.acks_needed -= 1;
        let done = reg.acks_needed == 0;
        self.cleanup(addr);
        done
    }

    /// Answers still expected for `addr`.
    pub fn acks_needed(&self, addr: Addr) -> u32 {
        self.registers.get(&addr).map_or(0, |r| r.acks_needed)
    }

    /// Returns true if a payload is buffered for `addr`.
    pub fn has_data(&self, addr: Addr) -> bool {
        self.registers.get(&addr).is_some_and(|r| r.data.is_some())
    }

    /// Buffered payload for `addr`.
    pub fn get_data(&self, addr: Addr) -> Option<&[u8]> {
        self.registers.get(&addr)?.data.as_ref().map(|(d, _)| d.as_slice())
    }

    /// Returns true if the buffered payload for `addr` is dirty.
    pub fn is_data_dirty(&self, addr: Addr) -> bool {
        self.registers
            .get(&addr)
            .and_then(|r| r.data.as_ref())
            .is_some_and(|(_, dirty)| *dirty)
    }

    /// Buffers a payload for `addr`, replacing any previous one.
    pub fn set_data(&mut self, addr: Addr, data: Vec<u8>, dirty: bool) {
        self.registers.entry(addr).or_default().data = Some((data, dirty));
    }

    /// Drops the buffered payload for `addr`.
    pub fn clear_data(&mut self, addr: Addr) {
        if let Some(reg) = self.registers.get_mut(&addr) {
            reg.data = None;
        }
        self.cleanup(addr);
    }

    /// Removes and returns the buffered payload and dirty bit for `addr`.
    pub fn take_data(&mut self, addr: Addr) -> Option<(Vec<u8>, bool)> {
        let data = self.registers.get_mut(&addr)?.data.take();
        self.cleanup(addr);
        data
    }

    /// Queues a whole-cache flush.
    ///
    /// # Returns
    ///
    /// `Ok` if no other flush is queued, `Stall` if it waits, `Reject` if full.
    pub fn insert_flush(&mut self, event: MemEvent) -> MshrStatus {
        if self.is_full() {
            return MshrStatus::Reject;
        }
        self.flushes.push_back(event);
        self.size += 1;
        if self.flushes.len() == 1 { MshrStatus::Ok } else { MshrStatus::Stall }
    }

    /// Flush currently being serviced.
    pub fn get_flush(&self) -> Option<&MemEvent> {
        self.flushes.front()
    }

    /// Returns true if the flush with `id` is queued.
    pub fn flush_contains(&self, id: EventId) -> bool {
        self.flushes.iter().any(|e| e.id == id)
    }

    /// Removes the flush being serviced.
    pub fn remove_flush(&mut self) -> Option<MemEvent> {
        let flush = self.flushes.pop_front()?;
        self.size -= 1;
        self.flush_acks = 0;
        Some(flush)
    }

    /// Adds `count` expected flush acknowledgements.
    pub const fn increment_flush_count(&mut self, count: u32) {
        self.flush_acks += count;
    }

    /// Records one flush acknowledgement; returns the number still expected.
    pub const fn decrement_flush_count(&mut self) -> u32 {
        self.flush_acks = self.flush_acks.saturating_sub(1);
        self.flush_acks
    }

    /// Flush acknowledgements still expected.
    #[inline]
    pub const fn flush_count(&self) -> u32 {
        self.flush_acks
    }

    /// Addresses with live registers, sorted.
    pub fn addresses(&self) -> Vec<Addr> {
        let mut addrs: Vec<Addr> = self.registers.keys().copied().collect();
        addrs.sort_unstable();
        addrs
    }

    fn cleanup(&mut self, addr: Addr) {
        if self.registers.get(&addr).is_some_and(Register::is_idle) {
            let _ = self.registers.remove(&addr);
        }
    }
}

impl fmt::Display for Mshr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MSHR size={}/{}", self.size, self.capacity)?;
        for addr in self.addresses() {
            let Some(reg) = self.registers.get(&addr) else {
                continue;
            };
            writeln!(
                f,
                "  {addr:#x} acks={} in_progress={} data={}",
                reg.acks_needed,
                reg.in_progress,
                reg.data.as_ref().map_or("none", |(_, d)| if *d { "dirty" } else { "clean" })
            )?;
            for slot in &reg.queue {
                match slot {
                    Slot::Event { event, inv_class } => {
                        writeln!(f, "    {event}{}", if *inv_class { " [inv]" } else { "" })?;
                    }
                    Slot::Writeback => writeln!(f, "    writeback")?,
                }
            }
        }
        for flush in &self.flushes {
            writeln!(f, "  flush {flush} acks={}", self.flush_acks)?;
        }
        Ok(())
    }
}
