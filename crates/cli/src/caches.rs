//! Reflexive cache model.
//!
//! The caches above the directory are not simulated in detail. They replay
//! the trace and answer whatever the directory asks of them on the next
//! cycle: invalidations are acknowledged, fetches return the held copy, and
//! forwarded flushes are acknowledged at once.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use dirsim_core::common::{Addr, line_base};
use dirsim_core::link::Link;
use dirsim_core::protocol::{Command, MemEvent};

use crate::trace::{Trace, TraceRecord};

#[derive(Debug, Clone)]
struct Held {
    data: Vec<u8>,
    dirty: bool,
}

/// Trace replay state and the copies each cache holds.
#[derive(Debug)]
pub struct CacheModel {
    caches: Vec<String>,
    directory: String,
    memory: String,
    line_size: u64,
    now: u64,
    pending: VecDeque<TraceRecord>,
    replies: VecDeque<MemEvent>,
    copies: HashMap<(String, Addr), Held>,
    /// Trace records handed to the directory.
    pub issued: u64,
    /// Completions received for issued records.
    pub completed: u64,
    /// Directory requests answered by the caches.
    pub answered: u64,
    /// NACKed requests reissued.
    pub retried: u64,
}

impl CacheModel {
    /// Creates a model replaying `trace` against the directory named `directory`.
    pub fn new(trace: Trace, directory: &str, memory: &str, line_size: u64) -> Self {
        Self {
            caches: trace.caches,
            directory: directory.to_owned(),
            memory: memory.to_owned(),
            line_size,
            now: 0,
            pending: trace.events.into(),
            replies: VecDeque::new(),
            copies: HashMap::new(),
            issued: 0,
            completed: 0,
            answered: 0,
            retried: 0,
        }
    }

    /// Returns true once the trace is exhausted and every answer was collected.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.replies.is_empty()
    }

    /// Lines held by `cache`, in address order.
    pub fn held_by(&self, cache: &str) -> Vec<Addr> {
        let mut lines: Vec<Addr> = self
            .copies
            .keys()
            .filter(|(c, _)| c == cache)
            .map(|&(_, addr)| addr)
            .collect();
        lines.sort_unstable();
        lines
    }

    fn answer(&mut self, to: &MemEvent, cmd: Command, copy: Option<Held>) {
        let mut resp = to.make_response(cmd);
        if let Some(copy) = copy {
            resp.payload = copy.data;
            resp.dirty = copy.dirty;
        }
        self.answered += 1;
        self.replies.push_back(resp);
    }

    fn receive(&mut self, event: MemEvent) {
        trace!(cycle = self.now, %event, "cache side");
        let key = (event.dst.clone(), event.base_addr);
        match event.cmd {
            Command::Inv | Command::ForceInv => {
                let _ = self.copies.remove(&key);
                self.answer(&event, Command::AckInv, None);
            }
            Command::FetchInv => {
                let copy = self.copies.remove(&key).unwrap_or_else(|| self.blank());
                self.answer(&event, Command::FetchResp, Some(copy));
            }
            Command::FetchInvX => {
                let blank = self.blank();
                let copy = self.copies.get_mut(&key).map_or(blank, |held| {
                    let out = held.clone();
                    held.dirty = false;
                    out
                });
                self.answer(&event, Command::FetchXResp, Some(copy));
            }
            Command::ForwardFlush => self.answer(&event, Command::AckFlush, None),
            Command::GetSResp | Command::GetXResp => {
                if !event.is_noncacheable() {
                    let dirty = event.cmd == Command::GetXResp;
                    let _ = self.copies.insert(
                        key,
                        Held {
                            data: event.payload,
                            dirty,
                        },
                    );
                }
                self.completed += 1;
            }
            Command::FlushLineResp => {
                if let Some(copy) = self.copies.get_mut(&key) {
                    copy.dirty = false;
                }
                self.completed += 1;
            }
            Command::AckPut | Command::WriteResp | Command::FlushAllResp => self.completed += 1,
            Command::Nack => {
                if let Some(rejected) = event.nacked {
                    debug!(cycle = self.now, event = %rejected, "reissuing nacked request");
                    self.retried += 1;
                    self.replies.push_back(*rejected);
                }
            }
            _ => {}
        }
    }

    fn blank(&self) -> Held {
        Held {
            data: vec![0; self.line_size as usize],
            dirty: false,
        }
    }

    fn issue(&mut self, record: &TraceRecord) -> MemEvent {
        let key = (record.cache.clone(), line_base(record.addr, self.line_size));
        let held = self.copies.get(&key).map(|c| c.data.clone());
        let event = record.to_event(&self.directory, self.line_size, held.as_deref());
        match record.cmd {
            Command::PutS | Command::PutE | Command::PutM | Command::FlushLineInv => {
                let _ = self.copies.remove(&key);
            }
            Command::PutX => {
                if let Some(copy) = self.copies.get_mut(&key) {
                    copy.dirty = false;
                }
            }
            _ => {}
        }
        self.issued += 1;
        event
    }
}

/// Shared handle to a [`CacheModel`] usable as the directory's cache link.
#[derive(Clone, Debug)]
pub struct CachePort(Arc<Mutex<CacheModel>>);

impl CachePort {
    /// Wraps a model in a shareable port.
    pub fn new(model: CacheModel) -> Self {
        Self(Arc::new(Mutex::new(model)))
    }

    /// Locks the model for inspection.
    pub fn lock(&self) -> MutexGuard<'_, CacheModel> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Link for CachePort {
    fn send(&mut self, event: MemEvent) {
        self.lock().receive(event);
    }

    fn recv(&mut self) -> Option<MemEvent> {
        let mut model = self.lock();
        if let Some(reply) = model.replies.pop_front() {
            return Some(reply);
        }
        if model.pending.front().is_some_and(|r| r.cycle <= model.now) {
            let record = model.pending.pop_front()?;
            return Some(model.issue(&record));
        }
        None
    }

    fn find_target_destination(&self, _addr: Addr) -> String {
        self.lock().memory.clone()
    }

    fn sources(&self) -> Vec<String> {
        self.lock().caches.clone()
    }

    fn clock(&mut self, cycle: u64) {
        self.lock().now = cycle;
    }

    fn status(&self) -> String {
        let model = self.lock();
        format!(
            "caches now={} pending={} replies={} issued={} completed={}",
            model.now,
            model.pending.len(),
            model.replies.len(),
            model.issued,
            model.completed
        )
    }
}
