//! Shootdowns from below: `Inv`, `ForceInv`, `FetchInv` and `FetchInvX`.
//!
//! These are inserted ahead of queued requests but behind a head already in
//! flight. When the line holds no cached copy the directory answers at once.

use super::DirectoryController;
use super::dispatch::Admission;
use super::mshr::InsertPosition;
use crate::common::DirectoryError;
use crate::protocol::{Command, MemEvent, State};

impl DirectoryController {
    pub(super) fn handle_shootdown(&mut self, event: &MemEvent) -> Result<(), DirectoryError> {
        let addr = event.base_addr;
        if self.mshr.contains(addr, event.id) {
            if !self.mshr.is_front(addr, event.id) {
                return Ok(());
            }
        } else {
            if self.try_answer_early(event) {
                return Ok(());
            }
            if self.admit(event, InsertPosition::Priority, true) != Admission::Head {
                return Ok(());
            }
        }

        if !self.check_resident(event)? {
            return Ok(());
        }
        match (self.state(addr), event.cmd) {
            (State::I, _) | (State::S, Command::FetchInvX) => {
                self.respond_to_memory(event, Vec::new(), false);
                self.finish_head(addr);
            }
            (State::S, cmd) => {
                self.start(addr, State::S_Inv);
                self.issue_invalidates(event, None, invalidation_for(cmd));
            }
            (State::M, Command::FetchInvX) => {
                self.start(addr, State::M_InvX);
                self.issue_fetch(event, Command::FetchInvX)?;
            }
            (State::M, Command::ForceInv) => {
                self.start(addr, State::M_Inv);
                self.issue_fetch(event, Command::ForceInv)?;
            }
            (State::M, _) => {
                self.start(addr, State::M_Inv);
                self.issue_fetch(event, Command::FetchInv)?;
            }
            (state @ (State::IS
                | State::IM
                | State::S_D
                | State::I_d
                | State::S_d
                | State::M_d
                | State::S_Inv
                | State::SD_Inv
                | State::SM_Inv
                | State::SB_Inv
                | State::M_Inv
                | State::M_InvX
                | State::S_B
                | State::I_B),
                _,
            ) => return Err(self.violation(event, state)),
        }
        Ok(())
    }

    /// Handles a fresh shootdown without queueing it when the line state allows.
    ///
    /// # Returns
    ///
    /// True if the shootdown was answered or rejected.
    fn try_answer_early(&mut self, event: &MemEvent) -> bool {
        let addr = event.base_addr;
        if !self.entry_mut(addr).is_cached() {
            return false;
        }
        let state = self.state(addr);
        // In IS/IM memory is supplying the data and no cache holds a copy yet;
        // a shared line keeps its copies under FetchInvX.
        let answer_now = match state {
            State::IS | State::IM => true,
            State::S | State::S_D | State::S_B => event.cmd == Command::FetchInvX,
            _ => false,
        };
        if answer_now {
            self.respond_to_memory(event, Vec::new(), false);
            return true;
        }
        match state {
            State::I if !self.mshr.is_hit(addr) => {
                self.respond_to_memory(event, Vec::new(), false);
                self.update_cache(addr);
                true
            }
            State::S_D | State::S_B => {
                if self.admit(event, InsertPosition::Priority, true) == Admission::Rejected {
                    return true;
                }
                if self.sharer_count(addr) == 0 {
                    let _ = self.mshr.remove_event(addr, event.id);
                    self.respond_to_memory(event, Vec::new(), false);
                    return true;
                }
                let next = if state == State::S_D { State::SD_Inv } else { State::SB_Inv };
                self.set_state(addr, next);
                self.issue_invalidates(event, None, invalidation_for(event.cmd));
                true
            }
            _ => false,
        }
    }
}

/// Command sent to sharers on behalf of a shootdown.
const fn invalidation_for(cmd: Command) -> Command {
    match cmd {
        Command::ForceInv => Command::ForceInv,
        _ => Command::Inv,
    }
}
