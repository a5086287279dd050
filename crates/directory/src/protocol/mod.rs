//! Coherence protocol vocabulary.
//!
//! This module defines what travels between the directory, the caches above it
//! and memory below it. It provides:
//! 1. **Commands:** The closed set of request, replacement, flush, shootdown and response commands.
//! 2. **States:** Stable, transient, invalidation-in-flight and flush-in-flight line states.
//! 3. **Events:** The message type with its identity, routing fields, payload and flags.

/// Protocol commands and their classification.
pub mod command;

/// Memory events (protocol messages).
pub mod event;

/// Directory line states and flush-barrier states.
pub mod state;

pub use command::{Command, CommandClass};
pub use event::{EventId, MemEvent, MemFlags};
pub use state::{FlushState, State};
