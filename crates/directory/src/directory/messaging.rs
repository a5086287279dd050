//! Outgoing message construction.
//!
//! Every message the directory emits is built here and pushed onto one of the
//! two timed queues: `net_queue` towards the caches, `mem_queue` towards memory.

use tracing::trace;

use super::DirectoryController;
use crate::common::{Addr, DirectoryError, NodeId};
use crate::config::CoherenceProtocol;
use crate::protocol::{Command, MemEvent, MemFlags, State};

impl DirectoryController {
    pub(super) fn send_to_cache(&mut self, mut event: MemEvent, delay: u64) {
        event.src.clone_from(&self.name);
        self.stats.record_sent(&event);
        self.trace_event("send", &event);
        self.net_queue.push(self.timestamp + delay, event);
    }

    pub(super) fn send_to_memory(&mut self, mut event: MemEvent) {
        event.src.clone_from(&self.name);
        if event.dst.is_empty() {
            event.dst = self.memory_name(event.base_addr);
        }
        self.trace_event("send", &event);
        self.mem_queue.push(self.timestamp + self.config.access_latency_cycles, event);
    }

    /// Name of the memory that owns `addr`.
    pub(super) fn memory_name(&self, addr: Addr) -> String {
        match &self.mem_link {
            Some(link) => link.find_target_destination(addr),
            None => self.cpu_link.find_target_destination(addr),
        }
    }

    pub(super) const fn access_delay(&self) -> u64 {
        self.config.access_latency_cycles
    }

    pub(super) const fn mshr_delay(&self) -> u64 {
        self.config.mshr_latency_cycles
    }

    /// Rejects `event` back to whoever sent it.
    pub(super) fn nack(&mut self, event: &MemEvent) {
        trace!(dir = %self.name, event = %event, "MSHR full, sending NACK");
        let nack = event.make_nack();
        if event.cmd.is_shootdown() || event.cmd == Command::ForwardFlush {
            self.stats.nack_sent += 1;
            self.send_to_memory(nack);
        } else {
            self.send_to_cache(nack, self.access_delay());
        }
    }

    /// Forwards a request to memory under a fresh id and remembers which line it is for.
    pub(super) fn issue_memory_request(&mut self, request: &MemEvent) {
        let addr = request.base_addr;
        let dst = self.memory_name(addr);
        let mut fwd = request.forward(&self.name, dst);
        if request.cmd == Command::Write {
            self.stats.memory_data_writes += 1;
        } else {
            fwd.addr = addr;
            fwd.size = self.config.line_size as u32;
            fwd.payload.clear();
            self.stats.memory_data_reads += 1;
        }
        let _ = self.mem_reqs.insert(fwd.id, addr);
        self.send_to_memory(fwd);
    }

    /// Sends `cmd` to every sharer except `exclude` and counts the answers owed.
    pub(super) fn issue_invalidates(&mut self, request: &MemEvent, exclude: Option<NodeId>, cmd: Command) {
        let addr = request.base_addr;
        let targets: Vec<NodeId> = self
            .store
            .get(addr)
            .map(|e| e.sharers().iter().copied().filter(|&n| Some(n) != exclude).collect())
            .unwrap_or_default();
        for &node in &targets {
            self.send_invalidate(node, request, cmd);
            self.mshr.increment_acks_needed(addr);
        }
    }

    fn send_invalidate(&mut self, node: NodeId, request: &MemEvent, cmd: Command) {
        let addr = request.base_addr;
        let mut inv = MemEvent::new(self.name.clone(), addr, addr, cmd)
            .with_dst(self.nodes.name(node))
            .with_size(self.config.line_size as u32);
        inv.rqstr.clone_from(&request.rqstr);
        self.responses.expect(addr, node, inv.id);
        let delay = self.access_delay();
        self.send_to_cache(inv, delay);
    }

    /// Sends `cmd` (`FetchInv` or `FetchInvX`) to the owner of the line.
    pub(super) fn issue_fetch(&mut self, request: &MemEvent, cmd: Command) -> Result<(), DirectoryError> {
        let addr = request.base_addr;
        let Some(owner) = self.store.get(addr).and_then(super::DirEntry::owner) else {
            return Err(self.violation(request, self.state(addr)));
        };
        self.send_invalidate(owner, request, cmd);
        Ok(())
    }

    /// Writes a full line back to memory.
    ///
    /// With `wait_writeback_ack` the line is blocked by a writeback marker
    /// until memory answers; otherwise no answer is requested.
    pub(super) fn writeback(&mut self, addr: Addr, payload: Vec<u8>) -> Result<(), DirectoryError> {
        let expected = self.config.line_size as usize;
        if payload.len() != expected {
            return Err(DirectoryError::PayloadSize {
                expected,
                actual: payload.len(),
            });
        }
        let mut wb = MemEvent::new(self.name.clone(), addr, addr, Command::PutM)
            .with_payload(payload)
            .with_dirty(true);
        if self.config.wait_writeback_ack {
            let _ = self.mem_reqs.insert(wb.id, addr);
            self.mshr.insert_writeback(addr);
        } else {
            wb.flags.insert(MemFlags::NO_RESPONSE);
        }
        self.stats.memory_data_writes += 1;
        self.send_to_memory(wb);
        Ok(())
    }

    /// Writes back `payload` if it is dirty.
    pub(super) fn writeback_if_dirty(&mut self, addr: Addr, payload: &[u8], dirty: bool) -> Result<(), DirectoryError> {
        if dirty && !payload.is_empty() {
            self.writeback(addr, payload.to_vec())?;
        }
        Ok(())
    }

    pub(super) fn send_ack_put(&mut self, put: &MemEvent) {
        let ack = put.make_response(Command::AckPut);
        let delay = self.access_delay();
        self.send_to_cache(ack, delay);
    }

    /// Answers a memory-originated shootdown with its default response.
    pub(super) fn respond_to_memory(&mut self, shootdown: &MemEvent, payload: Vec<u8>, dirty: bool) {
        let cmd = shootdown.cmd.response().unwrap_or(Command::AckInv);
        let mut resp = shootdown.make_response(cmd);
        if cmd == Command::FetchResp || cmd == Command::FetchXResp {
            resp.dirty = dirty && !payload.is_empty();
            resp.payload = payload;
        }
        self.send_to_memory(resp);
    }

    /// Forwards a line flush to memory, carrying data when some is supplied.
    pub(super) fn forward_flush_line(&mut self, request: &MemEvent, data: Option<(Vec<u8>, bool)>) {
        let addr = request.base_addr;
        let dst = self.memory_name(addr);
        let mut fwd = request.forward(&self.name, dst);
        fwd.addr = addr;
        match data {
            Some((payload, dirty)) if !payload.is_empty() => {
                fwd.payload = payload;
                fwd.dirty = dirty;
            }
            _ => {
                fwd.payload.clear();
                fwd.dirty = false;
            }
        }
        if fwd.dirty {
            self.stats.memory_data_writes += 1;
        }
        let _ = self.mem_reqs.insert(fwd.id, addr);
        self.send_to_memory(fwd);
    }

    /// Grants the line to the requester of `head` with `payload`.
    ///
    /// Under MESI a read that finds no other copies is granted exclusively.
    pub(super) fn grant(
        &mut self,
        addr: Addr,
        head: &MemEvent,
        payload: Vec<u8>,
        dirty: bool,
        delay: u64,
    ) -> Result<(), DirectoryError> {
        let requester = self.node(&head.src);
        let exclusive_reads = self.config.protocol == CoherenceProtocol::Mesi;
        let from = self.state(addr);
        let (cmd, to) = match head.cmd {
            Command::GetS => {
                let entry = self.entry_mut(addr);
                if exclusive_reads && entry.sharer_count() == 0 && entry.owner().is_none() {
                    entry.set_owner(requester);
                    (Command::GetXResp, State::M)
                } else {
                    entry.add_sharer(requester);
                    (Command::GetSResp, State::S)
                }
            }
            Command::GetX | Command::GetSX => {
                let entry = self.entry_mut(addr);
                entry.clear_sharers();
                entry.clear_owner();
                entry.set_owner(requester);
                (Command::GetXResp, State::M)
            }
            _ => return Err(self.violation(head, from)),
        };
        self.set_state(addr, to);
        let mut resp = head.make_response(cmd);
        resp.size = self.config.line_size as u32;
        resp.payload = payload;
        resp.dirty = dirty && cmd == Command::GetXResp;
        self.send_to_cache(resp, delay);
        Ok(())
    }

    /// Forwards a non-cacheable request to memory and remembers where to return the answer.
    pub(super) fn forward_noncacheable(&mut self, event: MemEvent) {
        self.stats.noncacheable_forwarded += 1;
        let dst = self.memory_name(event.base_addr);
        let fwd = event.forward(&self.name, dst);
        let expects_response = !event.flags.contains(MemFlags::NO_RESPONSE);
        if expects_response {
            let _ = self.noncache_mem_reqs.insert(fwd.id, event);
        }
        self.send_to_memory(fwd);
    }

    /// Routes a memory answer to a non-cacheable request back to its requester.
    pub(super) fn return_noncacheable(&mut self, original: &MemEvent, response: MemEvent) {
        let mut resp = original.make_response(response.cmd);
        resp.payload = response.payload;
        resp.size = response.size;
        resp.flags = response.flags;
        let delay = self.access_delay();
        self.send_to_cache(resp, delay);
    }
}
