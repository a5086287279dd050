//! Directory controller.
//!
//! The controller owns every structure the protocol needs and runs once per
//! simulated cycle. It provides:
//! 1. **Intake:** `handle_packet` classifies arrivals as coherent or pass-through and buffers them.
//! 2. **Scheduling:** `tick` drains due outgoing messages, replays deferred events, then admits
//!    new ones, letting each line be mutated by at most one event per tick.
//! 3. **Dispatch:** `handle` routes an event to its command handler, which consults the entry
//!    (reloading it if spilled) and the MSHR and emits follow-on messages.
//! 4. **Diagnostics:** `print_status` and `emergency_shutdown` dump the full directory state.

mod arbiter;
mod completion;
mod dispatch;
/// Directory entries.
pub mod entry;
/// Recency tracking for resident entries.
pub mod entry_cache;
mod flush;
mod messaging;
/// Miss Status Holding Registers.
pub mod mshr;
mod queue;
mod replacements;
mod requests;
mod residency;
mod responses;
mod shootdowns;
/// Live entry map and node registry.
pub mod store;

use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};

use tracing::{debug, error, trace};

pub use self::arbiter::Arbiter;
pub use self::entry::DirEntry;
pub use self::entry_cache::EntryCache;
pub use self::mshr::{InsertPosition, Mshr, MshrStatus};
pub use self::queue::OutQueue;
pub use self::responses::ResponseTracker;
pub use self::store::{EntryStore, NodeRegistry};

use crate::common::{Addr, DirectoryError, line_base};
use crate::config::DirectoryConfig;
use crate::link::Link;
use crate::protocol::{Command, CommandClass, EventId, FlushState, MemEvent, State};
use crate::stats::DirStats;

/// Arbitration key used by whole-cache flush traffic; never a line address.
const FLUSH_KEY: Addr = Addr::MAX;

/// Outcome of [`DirectoryController::handle`].
#[derive(Debug)]
pub enum Dispatch {
    /// The event was handled or durably queued.
    Consumed,
    /// The event's line was already claimed this tick; ownership returns to the caller.
    Deferred(MemEvent),
}

impl Dispatch {
    /// Returns true if the event was consumed.
    pub const fn is_consumed(&self) -> bool {
        matches!(self, Self::Consumed)
    }
}

/// An event waiting in the retry buffer.
#[derive(Debug)]
struct Retry {
    event: MemEvent,
    /// The event is a copy of an MSHR head; drop it if the MSHR no longer holds it.
    from_mshr: bool,
}

/// Cache-coherence directory.
///
/// # Example
///
/// ```ignore
/// let mut dir = DirectoryController::new(config, Box::new(cpu_link), Some(Box::new(mem_link)))?;
/// loop {
///     if let Err(e) = dir.tick() {
///         dir.emergency_shutdown();
///         return Err(e);
///     }
/// }
/// ```
pub struct DirectoryController {
    name: String,
    config: DirectoryConfig,
    timestamp: u64,

    cpu_link: Box<dyn Link>,
    mem_link: Option<Box<dyn Link>>,
    sources: Vec<String>,

    store: EntryStore,
    nodes: NodeRegistry,
    entry_cache: EntryCache,
    mshr: Mshr,
    responses: ResponseTracker,

    /// Forwarded memory requests: id -> line.
    mem_reqs: HashMap<EventId, Addr>,
    /// Entry reloads: id -> line.
    dir_entry_miss: HashMap<EventId, Addr>,
    /// Non-cacheable requests: forwarded id -> original event.
    noncache_mem_reqs: HashMap<EventId, MemEvent>,

    flush_state: FlushState,

    event_buffer: VecDeque<MemEvent>,
    retry_buffer: VecDeque<Retry>,
    net_queue: OutQueue,
    mem_queue: OutQueue,
    arbiter: Arbiter,

    stats: DirStats,
}

impl std::fmt::Debug for DirectoryController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryController")
            .field("name", &self.name)
            .field("timestamp", &self.timestamp)
            .field("entries", &self.store.len())
            .field("mshr", &self.mshr.size())
            .field("flush_state", &self.flush_state)
            .finish_non_exhaustive()
    }
}

impl DirectoryController {
    /// Creates a directory.
    ///
    /// # Arguments
    ///
    /// * `config` - Directory parameters; validated here.
    /// * `cpu_link` - Link to the caches. Its `sources()` become the flush broadcast set.
    /// * `mem_link` - Dedicated link to memory, or `None` to route memory traffic over `cpu_link`.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::InvalidConfig` if `config` fails validation.
    pub fn new(
        config: DirectoryConfig,
        cpu_link: Box<dyn Link>,
        mem_link: Option<Box<dyn Link>>,
    ) -> Result<Self, DirectoryError> {
        config.validate()?;
        let sources = cpu_link.sources();
        debug!(name = %config.name, sources = sources.len(), "directory created");
        Ok(Self {
            name: config.name.clone(),
            timestamp: 0,
            cpu_link,
            mem_link,
            sources,
            store: EntryStore::new(!config.load_new_entries),
            nodes: NodeRegistry::default(),
            entry_cache: EntryCache::new(config.entry_cache_size),
            mshr: Mshr::new(config.mshr_capacity()),
            responses: ResponseTracker::default(),
            mem_reqs: HashMap::new(),
            dir_entry_miss: HashMap::new(),
            noncache_mem_reqs: HashMap::new(),
            flush_state: FlushState::Ready,
            event_buffer: VecDeque::new(),
            retry_buffer: VecDeque::new(),
            net_queue: OutQueue::default(),
            mem_queue: OutQueue::default(),
            arbiter: Arbiter::new(config.max_requests_per_cycle),
            stats: DirStats::default(),
            config,
        })
    }

    /// Component name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Active configuration.
    pub const fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Current cycle.
    pub const fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Entry for a line, if tracked.
    pub fn entry(&self, addr: Addr) -> Option<&DirEntry> {
        self.store.get(addr)
    }

    /// Live entry map.
    pub const fn store(&self) -> &EntryStore {
        &self.store
    }

    /// Name-to-id registry.
    pub const fn nodes(&self) -> &NodeRegistry {
        &self.nodes
    }

    /// MSHR.
    pub const fn mshr(&self) -> &Mshr {
        &self.mshr
    }

    /// Resident-entry recency order.
    pub const fn entry_cache(&self) -> &EntryCache {
        &self.entry_cache
    }

    /// Outstanding invalidation and fetch answers.
    pub const fn responses(&self) -> &ResponseTracker {
        &self.responses
    }

    /// Flush barrier state.
    pub const fn flush_state(&self) -> FlushState {
        self.flush_state
    }

    /// Upstream sources discovered at construction.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Statistics.
    pub const fn stats(&self) -> &DirStats {
        &self.stats
    }

    /// Events waiting in the retry buffer.
    pub fn retry_len(&self) -> usize {
        self.retry_buffer.len()
    }

    /// Returns true when nothing is buffered, queued or outstanding.
    pub fn is_idle(&self) -> bool {
        self.event_buffer.is_empty()
            && self.retry_buffer.is_empty()
            && self.net_queue.is_empty()
            && self.mem_queue.is_empty()
            && self.mshr.is_empty()
            && self.mem_reqs.is_empty()
            && self.dir_entry_miss.is_empty()
            && self.noncache_mem_reqs.is_empty()
            && self.responses.is_empty()
    }

    /// Accepts an event from a link; it is processed on a later tick.
    ///
    /// Non-cacheable requests and their responses bypass the coherence
    /// machinery and are forwarded immediately.
    pub fn handle_packet(&mut self, mut event: MemEvent) {
        event.delivery_time = self.timestamp;
        if !event.cmd.is_response() {
            event.base_addr = line_base(event.addr, self.config.line_size);
        }
        self.trace_event("recv", &event);

        if event.is_noncacheable() {
            if event.cmd.is_response() {
                if let Some(original) = event
                    .response_to
                    .and_then(|id| self.noncache_mem_reqs.remove(&id))
                {
                    self.return_noncacheable(&original, event);
                    return;
                }
            } else {
                self.forward_noncacheable(event);
                return;
            }
        }
        self.stats.record_received(&event);
        self.event_buffer.push_back(event);
    }

    /// Processes one cycle.
    ///
    /// Drains due outgoing messages, polls the links, replays deferred events
    /// and then admits new events until the per-tick budget is spent.
    ///
    /// # Returns
    ///
    /// True if the directory has no work left.
    ///
    /// # Errors
    ///
    /// Returns the first protocol or bookkeeping error raised by a handler.
    /// The directory should be considered unusable afterwards.
    pub fn tick(&mut self) -> Result<bool, DirectoryError> {
        self.timestamp += 1;
        self.stats.cycles += 1;
        self.arbiter.reset();
        self.cpu_link.clock(self.timestamp);
        if let Some(link) = self.mem_link.as_mut() {
            link.clock(self.timestamp);
        }

        self.drain_outgoing();
        self.poll_links();
        self.process_retries()?;
        self.process_new_events()?;
        Ok(self.is_idle())
    }

    /// Dispatches one event if its line is free this tick.
    ///
    /// # Arguments
    ///
    /// * `event` - A coherent request or response.
    /// * `replay` - True when the event comes from the retry buffer.
    ///
    /// # Returns
    ///
    /// `Dispatch::Consumed` if the event was handled or queued, or
    /// `Dispatch::Deferred` with the event when another event already
    /// mutated its line this tick.
    ///
    /// # Errors
    ///
    /// Propagates protocol violations from the handlers.
    pub fn handle(&mut self, event: MemEvent, replay: bool) -> Result<Dispatch, DirectoryError> {
        if replay && self.is_stale_replay(&event) {
            trace!(dir = %self.name, event = %event, "dropping stale replay");
            return Ok(Dispatch::Consumed);
        }
        let key = self.arbitration_key(&event);
        if !self.arbiter.claim(key) {
            self.stats.same_cycle_conflicts += 1;
            trace!(dir = %self.name, addr = key, cmd = %event.cmd, "line busy this cycle, deferring");
            return Ok(Dispatch::Deferred(event));
        }
        self.arbiter.note_processed();
        self.dispatch(event, replay)?;
        Ok(Dispatch::Consumed)
    }

    fn drain_outgoing(&mut self) {
        let now = self.timestamp;
        while let Some(event) = self.net_queue.pop_due(now) {
            self.cpu_link.send(event);
        }
        while let Some(event) = self.mem_queue.pop_due(now) {
            match self.mem_link.as_mut() {
                Some(link) => link.send(event),
                None => self.cpu_link.send(event),
            }
        }
    }

    fn poll_links(&mut self) {
        while let Some(event) = self.cpu_link.recv() {
            self.handle_packet(event);
        }
        loop {
            let Some(event) = self.mem_link.as_mut().and_then(|l| l.recv()) else {
                break;
            };
            self.handle_packet(event);
        }
    }

    fn process_retries(&mut self) -> Result<(), DirectoryError> {
        let pending = std::mem::take(&mut self.retry_buffer);
        let mut kept = VecDeque::with_capacity(pending.len());
        for retry in pending {
            if retry.from_mshr && !self.mshr_holds(&retry.event) {
                continue;
            }
            if self.arbiter.exhausted() {
                kept.push_back(retry);
                continue;
            }
            let from_mshr = retry.from_mshr;
            if let Dispatch::Deferred(event) = self.handle(retry.event, true)? {
                kept.push_back(Retry { event, from_mshr });
            }
        }
        kept.append(&mut self.retry_buffer);
        self.retry_buffer = kept;
        Ok(())
    }

    fn process_new_events(&mut self) -> Result<(), DirectoryError> {
        while !self.arbiter.exhausted() {
            let Some(event) = self.event_buffer.pop_front() else {
                break;
            };
            if let Dispatch::Deferred(event) = self.handle(event, false)? {
                self.retry_buffer.push_back(Retry {
                    event,
                    from_mshr: false,
                });
            }
        }
        Ok(())
    }

    /// Returns true if the MSHR still holds `event` (line queue or flush queue).
    fn mshr_holds(&self, event: &MemEvent) -> bool {
        self.mshr.contains(event.base_addr, event.id) || self.mshr.flush_contains(event.id)
    }

    /// A replayed copy of a queued event is stale unless it heads its queue and
    /// has not started yet. Puts may act from anywhere in the queue.
    fn is_stale_replay(&self, event: &MemEvent) -> bool {
        if event.cmd.class() == CommandClass::Replacement {
            return false;
        }
        if self.mshr.flush_contains(event.id) {
            let is_front = self.mshr.get_flush().is_some_and(|f| f.id == event.id);
            return !is_front || self.flush_state != FlushState::Ready;
        }
        let addr = event.base_addr;
        self.mshr.contains(addr, event.id)
            && (!self.mshr.is_front(addr, event.id) || self.mshr.is_in_progress(addr))
    }

    /// Line an event mutates, resolving memory responses through the request maps.
    fn arbitration_key(&self, event: &MemEvent) -> Addr {
        if matches!(
            event.cmd,
            Command::FlushAll | Command::ForwardFlush | Command::UnblockFlush | Command::AckFlush
        ) {
            return FLUSH_KEY;
        }
        let probe = event.nacked.as_deref().unwrap_or(event);
        if probe.cmd == Command::ForwardFlush || probe.cmd == Command::UnblockFlush {
            return FLUSH_KEY;
        }
        [Some(probe.id), probe.response_to]
            .into_iter()
            .flatten()
            .find_map(|id| {
                self.dir_entry_miss
                    .get(&id)
                    .or_else(|| self.mem_reqs.get(&id))
                    .copied()
            })
            .unwrap_or(probe.base_addr)
    }

    /// Queues the MSHR head for `addr` for replay if it is waiting to run.
    fn replay_waiting(&mut self, addr: Addr) {
        if self.mshr.is_in_progress(addr) {
            return;
        }
        if let Some(head) = self.mshr.front(addr).cloned() {
            trace!(dir = %self.name, addr, event = %head, "replaying MSHR head");
            self.requeue(head);
        }
    }

    /// Queues every put waiting for `addr` for replay.
    fn replay_puts(&mut self, addr: Addr) {
        let puts: Vec<MemEvent> = self
            .mshr
            .events(addr)
            .filter(|e| e.cmd.class() == CommandClass::Replacement)
            .cloned()
            .collect();
        for put in puts {
            self.requeue(put);
        }
    }

    /// Queues the next whole-cache flush for replay.
    fn replay_flush(&mut self) {
        if let Some(flush) = self.mshr.get_flush().cloned() {
            self.requeue(flush);
        }
    }

    fn requeue(&mut self, event: MemEvent) {
        if self.retry_buffer.iter().any(|r| r.event.id == event.id) {
            return;
        }
        self.retry_buffer.push_back(Retry {
            event,
            from_mshr: true,
        });
    }

    fn is_debug_addr(&self, addr: Addr) -> bool {
        self.config.debug_addrs.is_empty() || self.config.debug_addrs.contains(&addr)
    }

    fn trace_event(&self, what: &str, event: &MemEvent) {
        if self.is_debug_addr(event.base_addr) {
            debug!(dir = %self.name, cycle = self.timestamp, "{what}: {event}");
        }
    }

    fn trace_state(&self, addr: Addr, from: State, to: State) {
        if from != to && self.is_debug_addr(addr) {
            debug!(dir = %self.name, cycle = self.timestamp, addr, %from, %to, "transition");
        }
    }

    /// Writes the complete directory state to `out`.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from `out`.
    pub fn print_status(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "=== Directory {} @ cycle {} ===", self.name, self.timestamp)?;
        writeln!(out, "flush state: {:?}", self.flush_state)?;
        writeln!(out, "entries ({}):", self.store.len())?;
        for entry in self.store.sorted() {
            match self.responses.outstanding(entry.base_addr()) {
                0 => writeln!(out, "  {entry}")?,
                n => writeln!(out, "  {entry} awaiting={n}")?,
            }
        }
        write!(out, "entry cache ({}/{}) lru->mru:", self.entry_cache.len(), self.entry_cache.capacity())?;
        for addr in self.entry_cache.iter() {
            write!(out, " {addr:#x}")?;
        }
        writeln!(out)?;
        write!(out, "{}", self.mshr)?;
        writeln!(out, "outstanding responses:")?;
        for (addr, node, id) in self.responses.sorted() {
            writeln!(out, "  {addr:#x} {} -> {id}", self.nodes.name(node))?;
        }
        writeln!(out, "memory requests: {}", self.mem_reqs.len())?;
        writeln!(out, "entry reloads: {}", self.dir_entry_miss.len())?;
        writeln!(out, "event buffer: {}", self.event_buffer.len())?;
        for event in &self.event_buffer {
            writeln!(out, "  {event}")?;
        }
        writeln!(out, "retry buffer: {}", self.retry_buffer.len())?;
        for retry in &self.retry_buffer {
            writeln!(out, "  {}", retry.event)?;
        }
        writeln!(out, "to caches:")?;
        for (time, event) in self.net_queue.snapshot() {
            writeln!(out, "  @{time} {event}")?;
        }
        writeln!(out, "to memory:")?;
        for (time, event) in self.mem_queue.snapshot() {
            writeln!(out, "  @{time} {event}")?;
        }
        writeln!(out, "cpu link: {}", self.cpu_link.status())?;
        if let Some(link) = &self.mem_link {
            writeln!(out, "mem link: {}", link.status())?;
        }
        Ok(())
    }

    /// Dumps the directory state to stderr after a fatal error.
    pub fn emergency_shutdown(&self) {
        error!(dir = %self.name, cycle = self.timestamp, "emergency shutdown");
        let stderr = io::stderr();
        let mut lock = stderr.lock();
        if let Err(e) = self.print_status(&mut lock) {
            error!(dir = %self.name, "failed to write status: {e}");
        }
    }
}
