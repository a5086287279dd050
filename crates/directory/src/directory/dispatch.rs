//! Command dispatch and shared handler helpers.

use super::mshr::{InsertPosition, MshrStatus};
use super::{DirEntry, DirectoryController};
use crate::common::{Addr, DirectoryError, NodeId};
use crate::protocol::{Command, MemEvent, State};

/// Result of placing an event in the MSHR.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Admission {
    /// The event heads its line queue and may act now.
    Head,
    /// The event waits behind another.
    Queued,
    /// The MSHR was full; a NACK has been sent.
    Rejected,
}

impl DirectoryController {
    /// Routes an event to the handler for its command.
    pub(super) fn dispatch(&mut self, event: MemEvent, replay: bool) -> Result<(), DirectoryError> {
        self.trace_event(if replay { "replay" } else { "handle" }, &event);
        match event.cmd {
            Command::GetS => self.handle_get_s(&event),
            Command::GetX | Command::GetSX => self.handle_get_x(&event),
            Command::Write => self.handle_write(&event),
            Command::PutS => self.handle_put_s(&event),
            Command::PutE => self.handle_put_e(&event),
            Command::PutM => self.handle_put_m(&event),
            Command::PutX => self.handle_put_x(&event),
            Command::FlushLine => self.handle_flush_line(&event),
            Command::FlushLineInv => self.handle_flush_line_inv(&event),
            Command::FlushAll | Command::ForwardFlush => self.handle_flush_all(event),
            Command::UnblockFlush => self.handle_unblock_flush(&event),
            Command::AckFlush => self.handle_ack_flush(&event),
            Command::FetchInv | Command::FetchInvX | Command::ForceInv | Command::Inv => {
                self.handle_shootdown(&event)
            }
            Command::GetSResp | Command::GetXResp => self.handle_data_response(event),
            Command::WriteResp => self.handle_write_response(&event),
            Command::FlushLineResp => self.handle_flush_line_response(&event),
            Command::FetchResp => self.handle_fetch_resp(event),
            Command::FetchXResp => self.handle_fetch_x_resp(event),
            Command::AckInv => self.handle_ack_inv(event),
            Command::AckPut => self.handle_ack_put(&event),
            Command::Nack => self.handle_nack(event),
            Command::FlushAllResp => Err(self.violation(&event, self.state(event.base_addr))),
        }
    }

    /// Builds the error for a command the current state does not accept.
    pub(super) fn violation(&self, event: &MemEvent, state: State) -> DirectoryError {
        DirectoryError::ProtocolViolation {
            cmd: event.cmd,
            state,
            addr: event.base_addr,
            event: event.id,
        }
    }

    /// Builds the error for a response that needs an MSHR head when there is none.
    pub(super) const fn missing_head(event: &MemEvent, addr: Addr) -> DirectoryError {
        DirectoryError::MissingMshrHead {
            cmd: event.cmd,
            addr,
        }
    }

    /// Id for a peer name, registering it on first sight.
    pub(super) fn node(&mut self, name: &str) -> NodeId {
        self.nodes.id(name)
    }

    /// Current state of a line; untracked lines are `I`.
    pub(super) fn state(&self, addr: Addr) -> State {
        self.store.get(addr).map_or(State::I, DirEntry::state)
    }

    /// Entry for a line, created on first reference.
    pub(super) fn entry_mut(&mut self, addr: Addr) -> &mut DirEntry {
        self.store.get_or_create(addr)
    }

    /// Changes a line's state.
    pub(super) fn set_state(&mut self, addr: Addr, state: State) {
        let entry = self.store.get_or_create(addr);
        let from = entry.state();
        entry.set_state(state);
        self.trace_state(addr, from, state);
    }

    /// Number of sharers of a line.
    pub(super) fn sharer_count(&self, addr: Addr) -> usize {
        self.store.get(addr).map_or(0, DirEntry::sharer_count)
    }

    /// Stable state implied by the sharer set: `S` with sharers, else `I`.
    pub(super) fn shared_or_invalid(&self, addr: Addr) -> State {
        if self.sharer_count(addr) > 0 { State::S } else { State::I }
    }

    /// Places `event` in its line queue unless it is already there.
    ///
    /// A full MSHR NACKs the event back to its sender without touching any
    /// directory state.
    pub(super) fn admit(
        &mut self,
        event: &MemEvent,
        position: InsertPosition,
        inv_class: bool,
    ) -> Admission {
        let addr = event.base_addr;
        if self.mshr.contains(addr, event.id) {
            return if self.mshr.is_front(addr, event.id) {
                Admission::Head
            } else {
                Admission::Queued
            };
        }
        if self.mshr.is_hit(addr) {
            self.stats.mshr_hits += 1;
        }
        match self.mshr.insert(addr, event.clone(), position, inv_class) {
            MshrStatus::Ok => Admission::Head,
            MshrStatus::Stall => Admission::Queued,
            MshrStatus::Reject => {
                self.nack(event);
                Admission::Rejected
            }
        }
    }

    /// FIFO admission for requests; true when the request heads its queue.
    pub(super) fn admit_request(&mut self, event: &MemEvent) -> bool {
        self.admit(event, InsertPosition::Back, false) == Admission::Head
    }

    /// Completes the MSHR head for `addr`: records latency, replays the next
    /// waiting event and refreshes the entry cache.
    pub(super) fn finish_head(&mut self, addr: Addr) {
        if let Some(done) = self.mshr.remove_front(addr) {
            let latency = self.timestamp.saturating_sub(done.delivery_time);
            self.stats.record_latency(done.cmd, latency);
        }
        self.replay_waiting(addr);
        self.update_cache(addr);
    }
}
