//! Responses that complete in-flight work.
//!
//! Memory answers (`GetSResp`, `GetXResp`, `AckPut`) are matched through the
//! forwarded-request map; cache answers (`AckInv`, `FetchResp`, `FetchXResp`)
//! through the responses-in-flight tracker. An answer nobody waits for any
//! more is dropped and counted as stale.

use tracing::trace;

use super::DirectoryController;
use crate::common::{Addr, DirectoryError, NodeId};
use crate::protocol::{Command, MemEvent, State};

/// Payload carried by a response, if any.
fn carried(event: &mut MemEvent) -> Option<(Vec<u8>, bool)> {
    if event.payload.is_empty() {
        None
    } else {
        Some((std::mem::take(&mut event.payload), event.dirty))
    }
}

impl DirectoryController {
    /// Counts one invalidation answer for `addr` and advances the line once all are in.
    pub(super) fn invalidation_acked(&mut self, addr: Addr, cause: &MemEvent) -> Result<(), DirectoryError> {
        if self.mshr.decrement_acks_needed(addr) {
            self.invalidations_done(addr, cause)?;
        }
        Ok(())
    }

    fn invalidations_done(&mut self, addr: Addr, cause: &MemEvent) -> Result<(), DirectoryError> {
        let Some(head) = self.mshr.front(addr).cloned() else {
            return Err(Self::missing_head(cause, addr));
        };
        match self.state(addr) {
            State::S_Inv => {
                let next = self.shared_or_invalid(addr);
                self.set_state(addr, next);
                if head.cmd.is_shootdown() {
                    self.respond_to_memory(&head, Vec::new(), false);
                    self.finish_head(addr);
                } else {
                    self.mshr.set_in_progress(addr, false);
                    self.replay_waiting(addr);
                }
            }
            State::SM_Inv => match self.mshr.take_data(addr) {
                Some((payload, dirty)) => {
                    self.grant(addr, &head, payload, dirty, self.mshr_delay())?;
                    self.finish_head(addr);
                }
                None => self.set_state(addr, State::IM),
            },
            State::SD_Inv => {
                self.complete_shootdown_behind_head(addr);
                match self.mshr.take_data(addr) {
                    Some((payload, dirty)) => {
                        self.grant(addr, &head, payload, dirty, self.mshr_delay())?;
                        self.finish_head(addr);
                    }
                    None => self.set_state(addr, State::IS),
                }
            }
            State::SB_Inv => {
                self.complete_shootdown_behind_head(addr);
                self.set_state(addr, State::I_B);
            }
            state => return Err(self.violation(cause, state)),
        }
        Ok(())
    }

    /// Answers the shootdown that was handled alongside the current head.
    fn complete_shootdown_behind_head(&mut self, addr: Addr) {
        let Some(id) = self.mshr.invalidation_behind_head(addr).map(|e| e.id) else {
            return;
        };
        if let Some(shootdown) = self.mshr.remove_event(addr, id) {
            self.respond_to_memory(&shootdown, Vec::new(), false);
            let latency = self.timestamp.saturating_sub(shootdown.delivery_time);
            self.stats.record_latency(shootdown.cmd, latency);
        }
    }

    /// The owner of `addr` gave up ownership, by answering a fetch or by a racing put or flush.
    ///
    /// # Arguments
    ///
    /// * `from` - The former owner.
    /// * `data` - Line data and dirty bit, if the owner returned any.
    /// * `keeps_copy` - The former owner keeps a shared copy.
    /// * `cause` - The event that delivered the answer, for error reporting.
    pub(super) fn fetch_completed(
        &mut self,
        addr: Addr,
        from: NodeId,
        data: Option<(Vec<u8>, bool)>,
        keeps_copy: bool,
        cause: &MemEvent,
    ) -> Result<(), DirectoryError> {
        let Some(head) = self.mshr.front(addr).cloned() else {
            return Err(Self::missing_head(cause, addr));
        };
        let state = self.state(addr);
        let entry = self.entry_mut(addr);
        entry.clear_owner();
        if keeps_copy {
            entry.add_sharer(from);
        }

        match (state, head.cmd) {
            // The owner downgraded itself while a FetchInv is still on its way
            // to it; that FetchInv now invalidates a shared copy.
            (State::M_Inv, _) if keeps_copy => {
                if let Some((payload, dirty)) = &data {
                    self.writeback_if_dirty(addr, payload, *dirty)?;
                }
                self.set_state(addr, State::S_Inv);
                self.mshr.set_acks_needed(addr, 1);
            }
            (State::M_Inv, Command::GetX | Command::GetSX) => match data {
                Some((payload, dirty)) => {
                    self.grant(addr, &head, payload, dirty, self.access_delay())?;
                    self.finish_head(addr);
                }
                None => {
                    self.set_state(addr, State::IM);
                    self.issue_memory_request(&head);
                }
            },
            (State::M_Inv, Command::Write | Command::FlushLineInv) => {
                if let Some((payload, dirty)) = &data {
                    self.writeback_if_dirty(addr, payload, *dirty)?;
                }
                self.set_state(addr, State::I);
                self.mshr.set_in_progress(addr, false);
                self.replay_waiting(addr);
            }
            (State::M_Inv, cmd) if cmd.is_shootdown() => {
                let (payload, dirty) = data.unwrap_or_default();
                if cmd.response() != Some(Command::FetchResp) {
                    self.writeback_if_dirty(addr, &payload, dirty)?;
                    self.respond_to_memory(&head, Vec::new(), false);
                } else {
                    self.respond_to_memory(&head, payload, dirty);
                }
                self.set_state(addr, State::I);
                self.finish_head(addr);
            }
            (State::M_InvX, Command::GetS) => match data {
                Some((payload, dirty)) => {
                    self.writeback_if_dirty(addr, &payload, dirty)?;
                    self.grant(addr, &head, payload, false, self.access_delay())?;
                    self.finish_head(addr);
                }
                None => {
                    let next = if self.sharer_count(addr) > 0 { State::S_D } else { State::IS };
                    self.set_state(addr, next);
                    self.issue_memory_request(&head);
                }
            },
            (State::M_InvX, Command::FlushLine) => {
                if let Some((payload, dirty)) = &data {
                    self.writeback_if_dirty(addr, payload, *dirty)?;
                }
                let next = self.shared_or_invalid(addr);
                self.set_state(addr, next);
                self.mshr.set_in_progress(addr, false);
                self.replay_waiting(addr);
            }
            (State::M_InvX, Command::FetchInvX) => {
                let (payload, dirty) = data.unwrap_or_default();
                let next = self.shared_or_invalid(addr);
                self.set_state(addr, next);
                self.respond_to_memory(&head, payload, dirty);
                self.finish_head(addr);
            }
            _ => return Err(self.violation(cause, state)),
        }
        Ok(())
    }

    /// `GetSResp`/`GetXResp` from memory, for a line or for a spilled entry.
    pub(super) fn handle_data_response(&mut self, mut event: MemEvent) -> Result<(), DirectoryError> {
        if let Some(addr) = event.response_to.and_then(|id| self.dir_entry_miss.remove(&id)) {
            return self.handle_entry_response(&event, addr);
        }
        let addr = self.memory_request_addr(&event)?;
        let state = self.state(addr);
        match state {
            State::IS | State::S_D | State::IM => {
                let Some(head) = self.mshr.front(addr).cloned() else {
                    return Err(Self::missing_head(&event, addr));
                };
                let payload = std::mem::take(&mut event.payload);
                self.grant(addr, &head, payload, event.dirty, self.access_delay())?;
                self.finish_head(addr);
            }
            State::SM_Inv | State::SD_Inv => {
                let payload = std::mem::take(&mut event.payload);
                self.mshr.set_data(addr, payload, event.dirty);
            }
            _ => return Err(self.violation(&event, state)),
        }
        Ok(())
    }

    /// Line a memory response belongs to; the forwarded request is forgotten.
    pub(super) fn memory_request_addr(&mut self, event: &MemEvent) -> Result<Addr, DirectoryError> {
        event
            .response_to
            .and_then(|id| self.mem_reqs.remove(&id))
            .ok_or_else(|| DirectoryError::UnmatchedResponse {
                cmd: event.cmd,
                id: event.response_to.unwrap_or(event.id),
            })
    }

    /// Matches a cache answer against the tracker; stale answers are dropped.
    fn expected_answer(&mut self, event: &MemEvent) -> Option<(Addr, NodeId)> {
        let addr = event.base_addr;
        let from = self.node(&event.src);
        if self.responses.take(addr, from).is_some() {
            return Some((addr, from));
        }
        self.stats.stale_dropped += 1;
        trace!(dir = %self.name, addr, src = %event.src, cmd = %event.cmd, "dropping stale answer");
        None
    }

    pub(super) fn handle_ack_inv(&mut self, mut event: MemEvent) -> Result<(), DirectoryError> {
        let Some((addr, from)) = self.expected_answer(&event) else {
            return Ok(());
        };
        let state = self.state(addr);
        if state.is_invalidating_sharers() {
            let _ = self.entry_mut(addr).remove_sharer(from);
            self.invalidation_acked(addr, &event)
        } else if state.is_fetching_owner() {
            let data = if event.evict { carried(&mut event) } else { None };
            self.fetch_completed(addr, from, data, false, &event)
        } else {
            Err(self.violation(&event, state))
        }
    }

    pub(super) fn handle_fetch_resp(&mut self, mut event: MemEvent) -> Result<(), DirectoryError> {
        let Some((addr, from)) = self.expected_answer(&event) else {
            return Ok(());
        };
        let state = self.state(addr);
        if state.is_invalidating_sharers() {
            let _ = self.entry_mut(addr).remove_sharer(from);
            self.invalidation_acked(addr, &event)
        } else if state.is_fetching_owner() {
            let data = carried(&mut event);
            self.fetch_completed(addr, from, data, false, &event)
        } else {
            Err(self.violation(&event, state))
        }
    }

    pub(super) fn handle_fetch_x_resp(&mut self, mut event: MemEvent) -> Result<(), DirectoryError> {
        let Some((addr, from)) = self.expected_answer(&event) else {
            return Ok(());
        };
        match self.state(addr) {
            State::M_InvX => {
                let data = carried(&mut event);
                self.fetch_completed(addr, from, data, true, &event)
            }
            state => Err(self.violation(&event, state)),
        }
    }

    /// Memory acknowledged a writeback; requests blocked behind it may run.
    pub(super) fn handle_ack_put(&mut self, event: &MemEvent) -> Result<(), DirectoryError> {
        let addr = self.memory_request_addr(event)?;
        if !self.mshr.remove_writeback(addr) {
            trace!(dir = %self.name, addr, "AckPut without a writeback marker");
        }
        self.replay_waiting(addr);
        self.update_cache(addr);
        Ok(())
    }

    /// Resends a rejected event.
    ///
    /// Invalidations and fetches are only resent while their answer is still
    /// expected; anything else is resent unconditionally.
    pub(super) fn handle_nack(&mut self, event: MemEvent) -> Result<(), DirectoryError> {
        let Some(nacked) = event.nacked else {
            return Err(DirectoryError::EmptyNack(event.id));
        };
        let retry = *nacked;
        let addr = retry.base_addr;
        if retry.cmd.is_shootdown() {
            let node = self.node(&retry.dst);
            if !self.responses.is_expected(addr, node, retry.id) {
                self.stats.stale_dropped += 1;
                trace!(dir = %self.name, addr, event = %retry, "dropping stale NACK");
                return Ok(());
            }
        }
        self.stats.resent += 1;
        trace!(dir = %self.name, addr, event = %retry, "resending NACKed event");
        if retry.cmd.is_shootdown() || matches!(retry.cmd, Command::ForwardFlush | Command::UnblockFlush) {
            self.send_to_cache(retry, self.mshr_delay());
        } else {
            self.send_to_memory(retry);
        }
        Ok(())
    }
}
