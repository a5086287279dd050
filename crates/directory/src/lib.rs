//! Cycle-level cache-coherence directory.
//!
//! This crate models the directory controller that sits between a set of
//! private caches and shared memory. It provides:
//! 1. **Protocol:** MESI/MSI commands, line states and the message type exchanged with peers.
//! 2. **Directory:** Entry store, entry cache with spill/reload, MSHR, and the dispatcher.
//! 3. **Scheduling:** Per-tick arbitration, retry replay, and timed outgoing queues.
//! 4. **Memory:** Latency controllers and a backing-memory endpoint for standalone runs.
//! 5. **Reporting:** Statistics and diagnostic state dumps.

/// Address helpers, node identities, and the crate error type.
pub mod common;
/// Directory configuration (defaults, protocol selection, memory timing).
pub mod config;
/// Directory controller (entries, entry cache, MSHR, dispatcher, scheduler).
pub mod directory;
/// Transport seam between the directory and its neighbours.
pub mod link;
/// Backing-memory model and latency controllers.
pub mod memory;
/// Coherence commands, states, and protocol messages.
pub mod protocol;
/// Directory statistics collection and reporting.
pub mod stats;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// Crate error type.
pub use crate::common::DirectoryError;
/// Directory controller; construct with `DirectoryController::new`.
pub use crate::directory::DirectoryController;
/// Protocol message exchanged over links.
pub use crate::protocol::MemEvent;
