//! Memory events.
//!
//! A [`MemEvent`] is one protocol message. Events are owned values: every
//! queue that holds one owns it, and delivery moves it to the next owner.
//! Responses and NACKs are built from the request they answer so that routing
//! fields (`src`/`dst`/`rqstr`) and correlation (`response_to`) stay consistent.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::command::Command;
use crate::common::Addr;

/// Monotonic source of event ids, shared by every component in the process.
static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl EventId {
    /// Allocates a fresh id.
    pub fn next() -> Self {
        Self(NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Event flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemFlags(pub u32);

impl MemFlags {
    /// Access bypasses coherence and is forwarded straight to memory.
    pub const NONCACHEABLE: u32 = 1 << 0;
    /// Sender does not expect a response.
    pub const NO_RESPONSE: u32 = 1 << 1;
    /// Operation succeeded (set on flush responses).
    pub const SUCCESS: u32 = 1 << 2;

    /// Returns true if every bit in `mask` is set.
    #[inline]
    pub const fn contains(self, mask: u32) -> bool {
        self.0 & mask == mask
    }

    /// Sets the bits in `mask`.
    #[inline]
    pub const fn insert(&mut self, mask: u32) {
        self.0 |= mask;
    }

    /// Clears the bits in `mask`.
    #[inline]
    pub const fn remove(&mut self, mask: u32) {
        self.0 &= !mask;
    }
}

/// A protocol message.
///
/// Trace files and the CLI deserialize events directly, so everything except
/// the command and address has a default; a missing `id` allocates a fresh one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemEvent {
    /// Unique id.
    #[serde(default = "EventId::next")]
    pub id: EventId,
    /// Id of the event this one answers.
    #[serde(default)]
    pub response_to: Option<EventId>,
    /// Command.
    pub cmd: Command,
    /// Target byte address.
    pub addr: Addr,
    /// Line-aligned address.
    #[serde(default)]
    pub base_addr: Addr,
    /// Name of the sender.
    #[serde(default)]
    pub src: String,
    /// Name of the receiver.
    #[serde(default)]
    pub dst: String,
    /// Name of the agent that originated the transaction.
    #[serde(default)]
    pub rqstr: String,
    /// Access size in bytes.
    #[serde(default)]
    pub size: u32,
    /// Data carried by the message.
    #[serde(default)]
    pub payload: Vec<u8>,
    /// Payload differs from memory.
    #[serde(default)]
    pub dirty: bool,
    /// Sender dropped its copy while answering.
    #[serde(default)]
    pub evict: bool,
    /// Flag bits; see [`MemFlags`].
    #[serde(default)]
    pub flags: MemFlags,
    /// Cycle the event was delivered to the directory.
    #[serde(default)]
    pub delivery_time: u64,
    /// The rejected event carried by a NACK.
    #[serde(default)]
    pub nacked: Option<Box<MemEvent>>,
}

impl MemEvent {
    /// Creates an event with a fresh id.
    ///
    /// # Arguments
    ///
    /// * `src` - Sender name; also recorded as the requester.
    /// * `addr` - Target byte address.
    /// * `base_addr` - Line-aligned address.
    /// * `cmd` - Command.
    ///
    /// # Returns
    ///
    /// An event with an empty payload, no flags and no destination.
    pub fn new(src: impl Into<String>, addr: Addr, base_addr: Addr, cmd: Command) -> Self {
        let src = src.into();
        Self {
            id: EventId::next(),
            response_to: None,
            cmd,
            addr,
            base_addr,
            rqstr: src.clone(),
            src,
            dst: String::new(),
            size: 0,
            payload: Vec::new(),
            dirty: false,
            evict: false,
            flags: MemFlags::default(),
            delivery_time: 0,
            nacked: None,
        }
    }

    /// Sets the destination.
    #[must_use]
    pub fn with_dst(mut self, dst: impl Into<String>) -> Self {
        self.dst = dst.into();
        self
    }

    /// Sets the payload and updates `size` to match.
    #[must_use]
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.size = payload.len() as u32;
        self.payload = payload;
        self
    }

    /// Sets the access size without a payload.
    #[must_use]
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Sets flag bits.
    #[must_use]
    pub fn with_flags(mut self, mask: u32) -> Self {
        self.flags.insert(mask);
        self
    }

    /// Marks the payload dirty.
    #[must_use]
    pub fn with_dirty(mut self, dirty: bool) -> Self {
        self.dirty = dirty;
        self
    }

    /// Returns true for accesses that bypass coherence.
    #[inline]
    pub const fn is_noncacheable(&self) -> bool {
        self.flags.contains(MemFlags::NONCACHEABLE)
    }

    /// Builds a response to this event.
    ///
    /// The response travels back to the sender, keeps the requester and
    /// addresses, copies the flags, and carries no payload.
    pub fn make_response(&self, cmd: Command) -> Self {
        Self {
            id: EventId::next(),
            response_to: Some(self.id),
            cmd,
            addr: self.addr,
            base_addr: self.base_addr,
            src: self.dst.clone(),
            dst: self.src.clone(),
            rqstr: self.rqstr.clone(),
            size: self.size,
            payload: Vec::new(),
            dirty: false,
            evict: false,
            flags: self.flags,
            delivery_time: 0,
            nacked: None,
        }
    }

    /// Builds the default response for this event's command, if it has one.
    pub fn default_response(&self) -> Option<Self> {
        self.cmd.response().map(|cmd| self.make_response(cmd))
    }

    /// Builds a NACK that carries a copy of this event back to its sender.
    pub fn make_nack(&self) -> Self {
        let mut nack = self.make_response(Command::Nack);
        nack.size = 0;
        nack.nacked = Some(Box::new(self.clone()));
        nack
    }

    /// Builds a copy of this request with a fresh id, sent from `src` to `dst`.
    ///
    /// Used when the directory forwards a request downstream and needs its own
    /// id to correlate the answer.
    pub fn forward(&self, src: &str, dst: impl Into<String>) -> Self {
        let mut fwd = self.clone();
        fwd.id = EventId::next();
        fwd.response_to = None;
        fwd.src = src.to_owned();
        fwd.dst = dst.into();
        fwd.nacked = None;
        fwd
    }
}

impl fmt::Display for MemEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} addr={:#x} base={:#x} src={} dst={} rqstr={} size={}",
            self.id, self.cmd, self.addr, self.base_addr, self.src, self.dst, self.rqstr, self.size
        )?;
        if self.dirty {
            f.write_str(" dirty")?;
        }
        if self.evict {
            f.write_str(" evict")?;
        }
        if let Some(to) = self.response_to {
            write!(f, " resp_to={to}")?;
        }
        Ok(())
    }
}
