//! Flushes.
//!
//! Line flushes push a line's data to memory, keeping (`FlushLine`) or
//! dropping (`FlushLineInv`) cached copies. Whole-cache flushes are a barrier:
//! 1. **Start:** the flush at the head of the flush queue moves the barrier to
//!    `Forward` and sends `ForwardFlush` to every source.
//! 2. **Collect:** each `AckFlush` counts down the expected acknowledgements.
//! 3. **Release:** a local `FlushAll` answers its requester and sends
//!    `UnblockFlush`; a `ForwardFlush` from below answers with `AckFlush` and
//!    waits for the matching `UnblockFlush`.

use tracing::debug;

use super::DirectoryController;
use super::dispatch::Admission;
use super::mshr::{InsertPosition, MshrStatus};
use crate::common::{Addr, DirectoryError, NodeId};
use crate::protocol::{Command, FlushState, MemEvent, MemFlags, State};

fn flush_data(event: &MemEvent) -> Option<(Vec<u8>, bool)> {
    (!event.payload.is_empty()).then(|| (event.payload.clone(), event.dirty))
}

impl DirectoryController {
    pub(super) fn handle_flush_line(&mut self, event: &MemEvent) -> Result<(), DirectoryError> {
        let addr = event.base_addr;
        let from = self.node(&event.src);
        if !self.mshr.contains(addr, event.id) && self.is_owner(addr, from) {
            match self.state(addr) {
                State::M_Inv => {
                    if self.admit(event, InsertPosition::Back, false) != Admission::Rejected {
                        self.fetch_completed(addr, from, flush_data(event), true, event)?;
                    }
                    return Ok(());
                }
                State::M_InvX => {
                    if self.admit(event, InsertPosition::Back, false) != Admission::Rejected
                        && self.responses.take(addr, from).is_some()
                    {
                        self.fetch_completed(addr, from, flush_data(event), true, event)?;
                    }
                    return Ok(());
                }
                _ => {}
            }
        }

        if !self.request_ready(event)? {
            return Ok(());
        }
        match self.state(addr) {
            State::I => {
                self.start(addr, State::I_B);
                self.forward_flush_line(event, None);
            }
            State::S => {
                self.start(addr, State::S_B);
                self.forward_flush_line(event, None);
            }
            State::M if self.is_owner(addr, from) => {
                let entry = self.entry_mut(addr);
                entry.clear_owner();
                entry.add_sharer(from);
                self.start(addr, State::S_B);
                self.forward_flush_line(event, flush_data(event));
            }
            State::M => {
                self.start(addr, State::M_InvX);
                self.issue_fetch(event, Command::FetchInvX)?;
            }
            state => return Err(self.violation(event, state)),
        }
        Ok(())
    }

    pub(super) fn handle_flush_line_inv(&mut self, event: &MemEvent) -> Result<(), DirectoryError> {
        let addr = event.base_addr;
        let from = self.node(&event.src);
        if !self.mshr.contains(addr, event.id) {
            let state = self.state(addr);
            if state.is_invalidating_sharers() && self.is_sharer(addr, from) {
                if self.admit(event, InsertPosition::Back, false) != Admission::Rejected {
                    let _ = self.entry_mut(addr).remove_sharer(from);
                    if self.responses.take(addr, from).is_some() {
                        self.invalidation_acked(addr, event)?;
                    }
                }
                return Ok(());
            }
            if state.is_fetching_owner() && self.is_owner(addr, from) {
                if self.admit(event, InsertPosition::Back, false) != Admission::Rejected {
                    let _ = self.responses.take(addr, from);
                    self.fetch_completed(addr, from, flush_data(event), false, event)?;
                }
                return Ok(());
            }
        }

        if !self.request_ready(event)? {
            return Ok(());
        }
        match self.state(addr) {
            State::I => {
                self.start(addr, State::I_B);
                self.forward_flush_line(event, None);
            }
            State::S => {
                let _ = self.entry_mut(addr).remove_sharer(from);
                if self.sharer_count(addr) == 0 {
                    self.start(addr, State::I_B);
                    self.forward_flush_line(event, None);
                } else {
                    self.start(addr, State::S_Inv);
                    self.issue_invalidates(event, None, Command::Inv);
                }
            }
            State::M if self.is_owner(addr, from) => {
                self.entry_mut(addr).clear_owner();
                self.start(addr, State::I_B);
                self.forward_flush_line(event, flush_data(event));
            }
            State::M => {
                self.start(addr, State::M_Inv);
                self.issue_fetch(event, Command::FetchInv)?;
            }
            state => return Err(self.violation(event, state)),
        }
        Ok(())
    }

    pub(super) fn handle_flush_line_response(&mut self, event: &MemEvent) -> Result<(), DirectoryError> {
        let addr = self.memory_request_addr(event)?;
        let Some(head) = self.mshr.front(addr).cloned() else {
            return Err(Self::missing_head(event, addr));
        };
        let state = self.state(addr);
        let next = match state {
            State::I_B => State::I,
            State::S_B => self.shared_or_invalid(addr),
            State::SB_Inv => State::S_Inv,
            _ => return Err(self.violation(event, state)),
        };
        self.set_state(addr, next);

        let mut resp = head.make_response(Command::FlushLineResp);
        resp.flags.remove(MemFlags::SUCCESS);
        if event.flags.contains(MemFlags::SUCCESS) {
            resp.flags.insert(MemFlags::SUCCESS);
        }
        self.send_to_cache(resp, self.access_delay());
        self.finish_head(addr);
        if next == State::S_Inv {
            // The shootdown behind the flush is now the head and already in flight.
            self.mshr.set_in_progress(addr, true);
        }
        Ok(())
    }

    /// `FlushAll` from a cache or `ForwardFlush` from below.
    pub(super) fn handle_flush_all(&mut self, event: MemEvent) -> Result<(), DirectoryError> {
        if !self.mshr.flush_contains(event.id) {
            match self.mshr.insert_flush(event.clone()) {
                MshrStatus::Ok => {}
                MshrStatus::Stall => return Ok(()),
                MshrStatus::Reject => {
                    self.nack(&event);
                    return Ok(());
                }
            }
        }
        if self.flush_state != FlushState::Ready {
            return Err(DirectoryError::FlushViolation {
                cmd: event.cmd,
                state: self.flush_state,
            });
        }

        self.flush_state = FlushState::Forward;
        let sources = self.sources.clone();
        debug!(dir = %self.name, cmd = %event.cmd, sources = sources.len(), "flush barrier started");
        for source in &sources {
            let mut fwd = MemEvent::new(self.name.clone(), 0, 0, Command::ForwardFlush).with_dst(source.clone());
            fwd.rqstr.clone_from(&event.rqstr);
            self.send_to_cache(fwd, self.access_delay());
        }
        self.mshr.increment_flush_count(sources.len() as u32);
        if sources.is_empty() {
            self.flush_acked(&event)?;
        }
        Ok(())
    }

    pub(super) fn handle_ack_flush(&mut self, event: &MemEvent) -> Result<(), DirectoryError> {
        if self.flush_state != FlushState::Forward || self.mshr.flush_count() == 0 {
            return Err(DirectoryError::FlushViolation {
                cmd: event.cmd,
                state: self.flush_state,
            });
        }
        if self.mshr.decrement_flush_count() == 0 {
            self.flush_acked(event)?;
        }
        Ok(())
    }

    /// Every source has flushed.
    fn flush_acked(&mut self, cause: &MemEvent) -> Result<(), DirectoryError> {
        let Some(flush) = self.mshr.get_flush().cloned() else {
            return Err(DirectoryError::FlushViolation {
                cmd: cause.cmd,
                state: self.flush_state,
            });
        };
        match flush.cmd {
            Command::FlushAll => {
                let resp = flush.make_response(Command::FlushAllResp);
                self.send_to_cache(resp, self.access_delay());
                self.release_flush(&flush);
            }
            _ => {
                let ack = flush.make_response(Command::AckFlush);
                self.send_to_memory(ack);
            }
        }
        Ok(())
    }

    /// `UnblockFlush` from below releases a forwarded flush.
    pub(super) fn handle_unblock_flush(&mut self, event: &MemEvent) -> Result<(), DirectoryError> {
        let forwarded = self.mshr.get_flush().filter(|f| f.cmd == Command::ForwardFlush).cloned();
        let Some(flush) = forwarded else {
            return Err(DirectoryError::FlushViolation {
                cmd: event.cmd,
                state: self.flush_state,
            });
        };
        self.release_flush(&flush);
        Ok(())
    }

    /// Sends `UnblockFlush` to every source and lets the next flush start.
    fn release_flush(&mut self, flush: &MemEvent) {
        for source in self.sources.clone() {
            let mut unblock = MemEvent::new(self.name.clone(), 0, 0, Command::UnblockFlush).with_dst(source);
            unblock.rqstr.clone_from(&flush.rqstr);
            self.send_to_cache(unblock, self.access_delay());
        }
        self.flush_state = FlushState::Ready;
        if let Some(done) = self.mshr.remove_flush() {
            let latency = self.timestamp.saturating_sub(done.delivery_time);
            self.stats.record_latency(done.cmd, latency);
        }
        debug!(dir = %self.name, "flush barrier released");
        self.replay_flush();
    }

    fn is_owner(&self, addr: Addr, node: NodeId) -> bool {
        self.store.get(addr).is_some_and(|e| e.is_owner(node))
    }

    fn is_sharer(&self, addr: Addr, node: NodeId) -> bool {
        self.store.get(addr).is_some_and(|e| e.is_sharer(node))
    }
}
