//! Functional backing memory.
//!
//! [`BackingMemory`] answers the traffic a directory sends downstream: data
//! reads, write-throughs, writebacks, line flushes, and the synthetic entry
//! spill/reload accesses. Answers are scheduled through a [`MemoryController`]
//! latency model. It can also originate shootdowns (`FetchInv`, `ForceInv`,
//! ...) to exercise the directory's downstream-invalidation paths.
//!
//! [`MemoryPort`] is a cloneable handle implementing [`Link`] so that the
//! directory can own one end while a test or driver inspects the other.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use super::controller::{self, MemoryController};
use crate::common::{Addr, line_base};
use crate::config::Config;
use crate::directory::OutQueue;
use crate::link::Link;
use crate::protocol::{Command, MemEvent, MemFlags};

/// Memory contents and the answers it has scheduled.
pub struct BackingMemory {
    name: String,
    line_size: u64,
    controller: Box<dyn MemoryController>,
    now: u64,
    lines: HashMap<Addr, Vec<u8>>,
    pending: OutQueue,
    injected: VecDeque<MemEvent>,
    received: Vec<MemEvent>,
    /// Data reads served.
    pub reads: u64,
    /// Line writes applied.
    pub writes: u64,
}

impl std::fmt::Debug for BackingMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackingMemory")
            .field("name", &self.name)
            .field("now", &self.now)
            .field("lines", &self.lines.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl BackingMemory {
    /// Creates an empty memory named `name` with timing from `config`.
    pub fn new(name: impl Into<String>, config: &Config) -> Self {
        Self {
            name: name.into(),
            line_size: config.directory.line_size,
            controller: controller::from_config(&config.memory),
            now: 0,
            lines: HashMap::new(),
            pending: OutQueue::default(),
            injected: VecDeque::new(),
            received: Vec::new(),
            reads: 0,
            writes: 0,
        }
    }

    /// Component name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Contents of the line containing `addr`; zero-filled if never written.
    pub fn read_line(&self, addr: Addr) -> Vec<u8> {
        let base = line_base(addr, self.line_size);
        self.lines
            .get(&base)
            .cloned()
            .unwrap_or_else(|| vec![0; self.line_size as usize])
    }

    /// Overwrites the line containing `addr`.
    pub fn write_line(&mut self, addr: Addr, data: &[u8]) {
        let base = line_base(addr, self.line_size);
        let mut line = self.read_line(base);
        let len = data.len().min(line.len());
        line[..len].copy_from_slice(&data[..len]);
        let _ = self.lines.insert(base, line);
        self.writes += 1;
    }

    /// Queues an event (typically a shootdown) to be delivered to the directory.
    pub fn inject(&mut self, event: MemEvent) {
        self.injected.push_back(event);
    }

    /// Drains the answers the directory sent back to memory-originated events.
    pub fn take_received(&mut self) -> Vec<MemEvent> {
        std::mem::take(&mut self.received)
    }

    /// Returns true if no answer is scheduled and nothing is waiting to be injected.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.injected.is_empty()
    }

    fn write_partial(&mut self, addr: Addr, data: &[u8]) {
        let base = line_base(addr, self.line_size);
        let offset = (addr - base) as usize;
        let mut line = self.read_line(base);
        let end = (offset + data.len()).min(line.len());
        line[offset..end].copy_from_slice(&data[..end - offset]);
        let _ = self.lines.insert(base, line);
        self.writes += 1;
    }

    fn schedule(&mut self, addr: Addr, event: MemEvent) {
        let latency = self.controller.access_latency(addr);
        self.pending.push(self.now + latency, event);
    }

    fn service(&mut self, event: MemEvent) {
        trace!(memory = %self.name, %event, "service");
        match event.cmd {
            Command::GetS | Command::GetX | Command::GetSX => {
                self.reads += 1;
                let cmd = if event.cmd == Command::GetS {
                    Command::GetSResp
                } else {
                    Command::GetXResp
                };
                let mut resp = event.make_response(cmd);
                let line = self.read_line(event.base_addr);
                resp.payload = if event.is_noncacheable() || event.size != self.line_size as u32 {
                    let offset = (event.addr - line_base(event.addr, self.line_size)) as usize;
                    let end = (offset + event.size as usize).min(line.len());
                    line[offset..end].to_vec()
                } else {
                    line
                };
                self.schedule(event.base_addr, resp);
            }
            Command::Write => {
                self.write_partial(event.addr, &event.payload);
                let resp = event.make_response(Command::WriteResp);
                self.schedule(event.base_addr, resp);
            }
            Command::PutM | Command::PutX | Command::PutE | Command::PutS => {
                if !event.payload.is_empty() && (event.dirty || event.cmd == Command::PutM) {
                    self.write_line(event.base_addr, &event.payload);
                }
                if !event.flags.contains(MemFlags::NO_RESPONSE) {
                    let resp = event.make_response(Command::AckPut);
                    self.schedule(event.base_addr, resp);
                }
            }
            Command::FlushLine | Command::FlushLineInv => {
                if event.dirty && !event.payload.is_empty() {
                    self.write_line(event.base_addr, &event.payload);
                }
                let mut resp = event.make_response(Command::FlushLineResp);
                resp.flags.insert(MemFlags::SUCCESS);
                self.schedule(event.base_addr, resp);
            }
            Command::FetchResp | Command::FetchXResp | Command::AckInv => {
                if event.dirty && !event.payload.is_empty() {
                    self.write_line(event.base_addr, &event.payload);
                }
                self.received.push(event);
            }
            Command::Nack => {
                if let Some(rejected) = event.nacked {
                    debug!(memory = %self.name, event = %rejected, "resending nacked event");
                    self.injected.push_back(*rejected);
                }
            }
            _ => self.received.push(event),
        }
    }
}

/// Shared handle to a [`BackingMemory`] usable as the directory's memory link.
#[derive(Clone, Debug)]
pub struct MemoryPort(Arc<Mutex<BackingMemory>>);

impl MemoryPort {
    /// Wraps a memory in a shareable port.
    pub fn new(memory: BackingMemory) -> Self {
        Self(Arc::new(Mutex::new(memory)))
    }

    /// Locks the memory for inspection or injection.
    pub fn lock(&self) -> MutexGuard<'_, BackingMemory> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Link for MemoryPort {
    fn send(&mut self, event: MemEvent) {
        self.lock().service(event);
    }

    fn recv(&mut self) -> Option<MemEvent> {
        let mut mem = self.lock();
        let now = mem.now;
        mem.pending.pop_due(now).or_else(|| mem.injected.pop_front())
    }

    fn find_target_destination(&self, _addr: Addr) -> String {
        self.lock().name.clone()
    }

    fn clock(&mut self, cycle: u64) {
        self.lock().now = cycle;
    }

    fn status(&self) -> String {
        let mem = self.lock();
        format!(
            "memory {} now={} pending={} injected={} lines={}",
            mem.name,
            mem.now,
            mem.pending.len(),
            mem.injected.len(),
            mem.lines.len()
        )
    }
}
