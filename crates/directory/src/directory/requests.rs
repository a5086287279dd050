//! Data requests from caches: `GetS`, `GetX`, `GetSX` and coherent `Write`.
//!
//! A request first takes its place in the MSHR. Only the head of a line's
//! queue acts, and only once the entry is resident.

use super::DirectoryController;
use crate::common::{Addr, DirectoryError};
use crate::protocol::{Command, MemEvent, State};

impl DirectoryController {
    /// Admits a request and returns true if it may act now.
    pub(super) fn request_ready(&mut self, event: &MemEvent) -> Result<bool, DirectoryError> {
        if !self.admit_request(event) {
            return Ok(false);
        }
        self.check_resident(event)
    }

    pub(super) fn handle_get_s(&mut self, event: &MemEvent) -> Result<(), DirectoryError> {
        if !self.request_ready(event)? {
            return Ok(());
        }
        let addr = event.base_addr;
        match self.state(addr) {
            State::I | State::S if self.mshr.has_data(addr) => self.serve_buffered(addr, event),
            State::I => {
                self.start(addr, State::IS);
                self.issue_memory_request(event);
                Ok(())
            }
            State::S => {
                self.start(addr, State::S_D);
                self.issue_memory_request(event);
                Ok(())
            }
            State::M => {
                self.start(addr, State::M_InvX);
                self.issue_fetch(event, Command::FetchInvX)
            }
            state @ (State::IS
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
            | State::I_B) => Err(self.violation(event, state)),
        }
    }

    pub(super) fn handle_get_x(&mut self, event: &MemEvent) -> Result<(), DirectoryError> {
        if !self.request_ready(event)? {
            return Ok(());
        }
        let addr = event.base_addr;
        let requester = self.node(&event.src);
        match self.state(addr) {
            State::I if self.mshr.has_data(addr) => self.serve_buffered(addr, event),
            State::I => {
                self.start(addr, State::IM);
                self.issue_memory_request(event);
                Ok(())
            }
            State::S => {
                let is_sharer = self.entry_mut(addr).is_sharer(requester);
                if is_sharer && self.sharer_count(addr) == 1 {
                    self.grant(addr, event, Vec::new(), false, self.access_delay())?;
                    self.finish_head(addr);
                } else if is_sharer {
                    self.start(addr, State::S_Inv);
                    self.issue_invalidates(event, Some(requester), Command::Inv);
                } else {
                    self.start(addr, State::SM_Inv);
                    self.issue_invalidates(event, None, Command::Inv);
                    self.issue_memory_request(event);
                }
                Ok(())
            }
            State::M => {
                self.start(addr, State::M_Inv);
                self.issue_fetch(event, Command::FetchInv)
            }
            state @ (State::IS
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
            | State::I_B) => Err(self.violation(event, state)),
        }
    }

    /// A coherent write: every cached copy is removed, then the data goes to memory.
    pub(super) fn handle_write(&mut self, event: &MemEvent) -> Result<(), DirectoryError> {
        if !self.request_ready(event)? {
            return Ok(());
        }
        let addr = event.base_addr;
        match self.state(addr) {
            State::I => {
                self.start(addr, State::IM);
                self.issue_memory_request(event);
                Ok(())
            }
            State::S => {
                self.start(addr, State::S_Inv);
                self.issue_invalidates(event, None, Command::Inv);
                Ok(())
            }
            State::M => {
                self.start(addr, State::M_Inv);
                self.issue_fetch(event, Command::FetchInv)
            }
            state @ (State::IS
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
            | State::I_B) => Err(self.violation(event, state)),
        }
    }

    pub(super) fn handle_write_response(&mut self, event: &MemEvent) -> Result<(), DirectoryError> {
        let addr = self.memory_request_addr(event)?;
        let state = self.state(addr);
        if state != State::IM {
            return Err(self.violation(event, state));
        }
        let Some(head) = self.mshr.front(addr).cloned() else {
            return Err(Self::missing_head(event, addr));
        };
        self.set_state(addr, State::I);
        let mut resp = head.make_response(Command::WriteResp);
        resp.flags = event.flags;
        self.send_to_cache(resp, self.access_delay());
        self.finish_head(addr);
        Ok(())
    }

    /// Moves the head into a transient state and marks it in progress.
    pub(super) fn start(&mut self, addr: Addr, state: State) {
        self.set_state(addr, state);
        self.mshr.set_in_progress(addr, true);
    }

    /// Answers the head from data already buffered in the MSHR.
    fn serve_buffered(&mut self, addr: Addr, event: &MemEvent) -> Result<(), DirectoryError> {
        let Some((payload, dirty)) = self.mshr.take_data(addr) else {
            return Err(Self::missing_head(event, addr));
        };
        self.grant(addr, event, payload, dirty, self.mshr_delay())?;
        self.finish_head(addr);
        Ok(())
    }
}
