//! Voluntary replacements: `PutS`, `PutE`, `PutM` and `PutX`.
//!
//! Puts never wait behind the head of their line. They act on the entry as
//! soon as it is resident, and a put that races an outstanding fetch or
//! invalidation to its sender stands in for that answer.

use super::DirectoryController;
use super::dispatch::Admission;
use super::mshr::InsertPosition;
use crate::common::{DirectoryError, NodeId};
use crate::protocol::{MemEvent, State};

impl DirectoryController {
    /// Returns true if the entry is resident; otherwise queues the put and starts a reload.
    fn put_ready(&mut self, event: &MemEvent) -> Result<bool, DirectoryError> {
        if self.entry_mut(event.base_addr).is_cached() {
            return Ok(true);
        }
        if self.admit(event, InsertPosition::Back, false) != Admission::Rejected {
            self.load_entry(event)?;
        }
        Ok(false)
    }

    fn owner_of(&mut self, event: &MemEvent) -> Result<NodeId, DirectoryError> {
        let addr = event.base_addr;
        let from = self.node(&event.src);
        if self.store.get(addr).is_some_and(|e| e.is_owner(from)) {
            Ok(from)
        } else {
            Err(DirectoryError::NotOwner {
                cmd: event.cmd,
                addr,
                src: event.src.clone(),
            })
        }
    }

    pub(super) fn handle_put_s(&mut self, event: &MemEvent) -> Result<(), DirectoryError> {
        if !self.put_ready(event)? {
            return Ok(());
        }
        let addr = event.base_addr;
        let from = self.node(&event.src);
        let _ = self.entry_mut(addr).remove_sharer(from);
        match self.state(addr) {
            State::S => {
                let next = self.shared_or_invalid(addr);
                self.set_state(addr, next);
                self.send_ack_put(event);
            }
            State::S_D | State::S_B => self.send_ack_put(event),
            state if state.is_invalidating_sharers() => {
                // An invalidation to the sender is in flight; the put answers it.
                if self.responses.take(addr, from).is_some() {
                    self.invalidation_acked(addr, event)?;
                } else {
                    self.send_ack_put(event);
                }
            }
            state => return Err(self.violation(event, state)),
        }
        self.finish_put(event);
        Ok(())
    }

    pub(super) fn handle_put_e(&mut self, event: &MemEvent) -> Result<(), DirectoryError> {
        if !self.put_ready(event)? {
            return Ok(());
        }
        let addr = event.base_addr;
        let from = self.owner_of(event)?;
        match self.state(addr) {
            State::M => {
                self.entry_mut(addr).clear_owner();
                self.set_state(addr, State::I);
                self.send_ack_put(event);
            }
            State::M_Inv | State::M_InvX => {
                let _ = self.responses.take(addr, from);
                self.fetch_completed(addr, from, None, false, event)?;
            }
            state => return Err(self.violation(event, state)),
        }
        self.finish_put(event);
        Ok(())
    }

    pub(super) fn handle_put_m(&mut self, event: &MemEvent) -> Result<(), DirectoryError> {
        if !self.put_ready(event)? {
            return Ok(());
        }
        let addr = event.base_addr;
        let from = self.owner_of(event)?;
        match self.state(addr) {
            State::M => {
                self.writeback(addr, event.payload.clone())?;
                self.entry_mut(addr).clear_owner();
                self.set_state(addr, State::I);
                self.send_ack_put(event);
            }
            State::M_Inv | State::M_InvX => {
                let _ = self.responses.take(addr, from);
                let data = Some((event.payload.clone(), true));
                self.fetch_completed(addr, from, data, false, event)?;
            }
            state => return Err(self.violation(event, state)),
        }
        self.finish_put(event);
        Ok(())
    }

    /// Downgrade with data: the owner keeps a shared copy.
    pub(super) fn handle_put_x(&mut self, event: &MemEvent) -> Result<(), DirectoryError> {
        if !self.put_ready(event)? {
            return Ok(());
        }
        let addr = event.base_addr;
        let from = self.owner_of(event)?;
        let data = Some((event.payload.clone(), event.dirty));
        match self.state(addr) {
            State::M => {
                self.writeback_if_dirty(addr, &event.payload, event.dirty)?;
                let entry = self.entry_mut(addr);
                entry.clear_owner();
                entry.add_sharer(from);
                self.set_state(addr, State::S);
                self.send_ack_put(event);
            }
            State::M_InvX => {
                let _ = self.responses.take(addr, from);
                self.fetch_completed(addr, from, data, true, event)?;
            }
            // The FetchInv stays outstanding and now invalidates the shared copy.
            State::M_Inv => self.fetch_completed(addr, from, data, true, event)?,
            state => return Err(self.violation(event, state)),
        }
        self.finish_put(event);
        Ok(())
    }

    /// Drops the put from the MSHR if it was queued there and refreshes the entry.
    fn finish_put(&mut self, event: &MemEvent) {
        let addr = event.base_addr;
        let _ = self.mshr.remove_event(addr, event.id);
        let latency = self.timestamp.saturating_sub(event.delivery_time);
        self.stats.record_latency(event.cmd, latency);
        self.replay_waiting(addr);
        self.update_cache(addr);
    }
}
